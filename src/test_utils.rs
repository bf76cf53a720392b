//! Shared doubles for the engine tests: scripted randomness and a recording
//! sender.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::shaping::{DispatchBody, RandomSource, RequestSender, SendError};

/// A [`RandomSource`] replaying a fixed sequence of unit draws.
///
/// Ranged draws go through the trait's default implementations, so a script
/// of unit values controls every decision deterministically. A plain script
/// panics on exhaustion (catching draws a branch should never make); a
/// cycling script repeats forever.
pub struct ScriptedRandom {
    draws: VecDeque<f64>,
    cycle: bool,
}

impl ScriptedRandom {
    pub fn new(draws: impl IntoIterator<Item = f64>) -> Self {
        Self {
            draws: draws.into_iter().collect(),
            cycle: false,
        }
    }

    pub fn cycling(draws: impl IntoIterator<Item = f64>) -> Self {
        Self {
            draws: draws.into_iter().collect(),
            cycle: true,
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn unit(&mut self) -> f64 {
        let value = self
            .draws
            .pop_front()
            .expect("scripted random draws exhausted");
        if self.cycle {
            self.draws.push_back(value);
        }
        value
    }
}

/// A [`RequestSender`] that records every dispatched body and resolves
/// immediately with a fixed outcome.
#[derive(Clone)]
pub struct MockSender {
    fail: bool,
    sent: Arc<AtomicU64>,
    bodies: Arc<Mutex<Vec<DispatchBody>>>,
}

impl MockSender {
    pub fn succeeding() -> Self {
        Self {
            fail: false,
            sent: Arc::new(AtomicU64::new(0)),
            bodies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::succeeding()
        }
    }

    /// Number of completed sends.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    /// Every body dispatched so far, in completion order.
    pub fn bodies(&self) -> Vec<DispatchBody> {
        self.bodies.lock().unwrap().clone()
    }
}

impl RequestSender for MockSender {
    fn send(&self, body: DispatchBody) -> impl Future<Output = Result<(), SendError>> + Send {
        let this = self.clone();
        async move {
            this.bodies.lock().unwrap().push(body);
            this.sent.fetch_add(1, Ordering::SeqCst);
            if this.fail {
                Err(SendError::Timeout)
            } else {
                Ok(())
            }
        }
    }
}
