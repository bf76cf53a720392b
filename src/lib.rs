//! Synthetic load generator driven by a token-bucket admission engine.
//!
//! This crate drives a downstream HTTP endpoint at a configured average rate
//! while injecting realistic irregularity into the traffic:
//!
//! 1. **Token bucket**: a fractional-credit bucket refilled on a fixed tick
//!    controls the average dispatch rate.
//! 2. **Traffic shaper**: a per-second stochastic state machine multiplies
//!    the refill rate to simulate bursts (factor > 1) and quiet periods
//!    (factor 0), each with a bounded random duration.
//! 3. **Concurrency gate**: a bounded permit gate caps in-flight requests;
//!    when it saturates, the consumed token is refunded to the bucket rather
//!    than dropped, so saturation defers work instead of losing it.
//!
//! Per-dispatch micro-jitter keeps request spacing uneven, the way real
//! clients behave.
//!
//! # Basic usage
//! ```no_run
//! use load_shaper::shaping::{Dispatcher, GeneratorSettings, HttpSender};
//!
//! # async fn run() {
//! let settings = GeneratorSettings::builder()
//!     .target_qps(25.0)
//!     .endpoint_url("http://localhost:8080/push".into())
//!     .build();
//! let sender = HttpSender::new(&settings).unwrap();
//! let handle = Dispatcher::new(settings, sender).spawn();
//! tokio::signal::ctrl_c().await.unwrap();
//! handle.shutdown().await;
//! # }
//! ```
//!
//! # Safety & concurrency
//! - Bucket and shaper state are mutex-guarded; the gate is a tokio
//!   semaphore. No unsafe code.
//! - The refill/drain timer is never blocked by jitter sleeps or network
//!   calls; those run on spawned tasks.
//!
//! # Observability
//! Structured `tracing` lines per completed request plus `metrics` counters
//! and histograms; an optional periodic one-line summary of the run.
pub mod shaping;

#[cfg(test)]
pub mod test_utils;

#[macro_use]
extern crate tracing;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
