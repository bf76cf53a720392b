use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded counting gate limiting simultaneously in-flight dispatches.
///
/// Acquisition is non-blocking: a saturated gate signals backpressure to the
/// caller instead of queueing. Release happens when the returned
/// [`InFlightPermit`] drops, which ties "exactly one release per acquire" to
/// ownership rather than caller discipline — every completion path (success,
/// error, timeout, panic unwinding of the request task) releases once.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

/// Permit held for the lifetime of one in-flight dispatch.
#[derive(Debug)]
pub struct InFlightPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Creates a gate with `limit` permits. A limit of 0 is clamped to 1.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Attempts to take a permit without waiting.
    pub fn try_acquire(&self) -> Option<InFlightPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| InFlightPermit { _permit: permit })
    }

    /// Number of permits currently held.
    pub fn in_flight(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }

    /// Configured permit limit.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_never_exceeds_limit() {
        let gate = ConcurrencyGate::new(2);
        let a = gate.try_acquire();
        let b = gate.try_acquire();
        assert!(a.is_some());
        assert!(b.is_some());
        assert_eq!(gate.in_flight(), 2);

        assert!(gate.try_acquire().is_none());
        assert_eq!(gate.in_flight(), 2);

        drop(a);
        drop(b);
    }

    #[test]
    fn drop_releases_exactly_once() {
        let gate = ConcurrencyGate::new(1);
        let permit = gate.try_acquire().expect("gate empty");
        assert_eq!(gate.in_flight(), 1);

        drop(permit);
        assert_eq!(gate.in_flight(), 0);

        // Freed capacity is reusable.
        let again = gate.try_acquire();
        assert!(again.is_some());
        assert_eq!(gate.in_flight(), 1);
    }

    #[test]
    fn zero_limit_is_clamped() {
        let gate = ConcurrencyGate::new(0);
        assert_eq!(gate.limit(), 1);
        assert!(gate.try_acquire().is_some());
    }
}
