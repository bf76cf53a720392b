use std::sync::Mutex;

/// A fractional token bucket controlling the average dispatch rate.
///
/// The balance is a float so that sub-unit refills (e.g. 0.5 tokens per
/// 100 ms tick at 5 qps) accumulate instead of rounding to zero. Refill
/// saturates at `capacity`; consumption is in whole-token units. Both
/// operations are safe under concurrent callers from the tick task and the
/// drain task.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: Mutex<f64>,
}

impl TokenBucket {
    /// Creates an empty bucket. A capacity below 1 is clamped to 1.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity: f64::from(capacity.max(1)),
            tokens: Mutex::new(0.0),
        }
    }

    /// Adds `amount` tokens, saturating at capacity. Non-positive (or NaN)
    /// amounts are ignored. Overflow beyond capacity is discarded, not
    /// queued, which caps the backlog a pause/burst cycle can bank.
    pub fn add(&self, amount: f64) {
        if !(amount > 0.0) {
            return;
        }
        let mut tokens = self.tokens.lock().unwrap();
        *tokens = (*tokens + amount).min(self.capacity);
    }

    /// Consumes one whole token if at least 1.0 is available.
    ///
    /// Returns `false` and leaves the balance untouched otherwise. The check
    /// and decrement happen under one lock, so two callers can never consume
    /// the same unit.
    pub fn try_consume_one(&self) -> bool {
        let mut tokens = self.tokens.lock().unwrap();
        if *tokens >= 1.0 {
            *tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current balance, for summaries and tests.
    pub fn level(&self) -> f64 {
        *self.tokens.lock().unwrap()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}
