use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge, histogram};

/// Cumulative counters for one generator run.
///
/// Updated from the drain loop and the per-request tasks; read by the
/// periodic summary. Every update also feeds the `metrics` registry so an
/// installed recorder sees the same numbers the log lines do.
#[derive(Debug, Default)]
pub struct DispatchStats {
    issued: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    refunded: AtomicU64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_issued(&self) {
        self.issued.fetch_add(1, Ordering::Relaxed);
        counter!("load_shaper_requests_issued_total").increment(1);
    }

    pub fn record_success(&self, elapsed_ms: u64) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        counter!("load_shaper_requests_total", "outcome" => "ok").increment(1);
        histogram!("load_shaper_request_elapsed_ms").record(elapsed_ms as f64);
    }

    pub fn record_failure(&self, elapsed_ms: u64) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        counter!("load_shaper_requests_total", "outcome" => "failed").increment(1);
        histogram!("load_shaper_request_elapsed_ms").record(elapsed_ms as f64);
    }

    /// A token was consumed but handed back because the gate was saturated.
    pub fn record_refund(&self) {
        self.refunded.fetch_add(1, Ordering::Relaxed);
        counter!("load_shaper_tokens_refunded_total").increment(1);
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn refunded(&self) -> u64 {
        self.refunded.load(Ordering::Relaxed)
    }

    /// One-line rollup of the run so far.
    pub fn emit_summary(&self, in_flight: usize, bucket_level: f64) {
        gauge!("load_shaper_in_flight").set(in_flight as f64);
        info!(
            target: "load_shaper::summary",
            issued = self.issued(),
            ok = self.succeeded(),
            failed = self.failed(),
            refunded = self.refunded(),
            in_flight,
            bucket_level,
            "dispatch summary"
        );
    }
}
