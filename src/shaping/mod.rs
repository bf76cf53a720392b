//! The admission and shaping engine: rate, concurrency and irregularity.

mod bucket;
mod gate;
mod random;
mod shaper;

pub mod dispatcher;
pub mod sender;
pub mod stats;

pub use bucket::TokenBucket;
pub use dispatcher::{Dispatcher, GeneratorHandle};
pub use gate::{ConcurrencyGate, InFlightPermit};
pub use random::{RandomSource, SmallRngSource};
pub use sender::{DispatchBody, HttpSender, RequestSender, SendError};
pub use shaper::{ShaperMode, TrafficShaper};

use std::env;
use std::str::FromStr;

use bon::Builder;

/// Configuration of the load generator.
///
/// All fields have defaults tuned for a local demo target (10 requests per
/// second with mild burst/pause irregularity). Out-of-range values never
/// fail construction; each component clamps its own inputs to a sane range
/// (e.g. a duration range with `max < min` becomes `min..=min + 1`).
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `target_qps` | 10.0 | Average dispatch rate the bucket refills toward |
/// | `token_refill_ms` | 100 | Refill/drain tick interval |
/// | `token_bucket_capacity` | 200 | Max banked tokens; caps backlog after a pause |
/// | `concurrency_limit` | 100 | Max simultaneously in-flight requests |
/// | `jitter_ms_max` | 150 | Upper bound of the uniform pre-dispatch delay (0 disables) |
/// | `burst_enabled` | true | Allow burst windows |
/// | `burst_probability_per_second` | 0.10 | Chance per second of entering a burst |
/// | `burst_duration_ms_min/max` | 800/1800 | Uniform burst window length |
/// | `burst_factor_min/max` | 2.0/4.0 | Uniform burst rate multiplier |
/// | `pause_enabled` | true | Allow pause windows |
/// | `pause_probability_per_second` | 0.06 | Chance per second of entering a pause |
/// | `pause_duration_ms_min/max` | 1200/4500 | Uniform pause window length |
/// | `request_timeout_secs` | 4 | Per-request timeout; expiry counts as failure |
/// | `endpoint_url` | `http://127.0.0.1:8080/push` | Downstream POST target |
/// | `summary_interval_secs` | 10 | Periodic summary log cadence (0 disables) |
///
/// # Example
/// ```
/// use load_shaper::shaping::GeneratorSettings;
///
/// let settings = GeneratorSettings::builder()
///     .target_qps(50.0)
///     .concurrency_limit(32)
///     .pause_enabled(false)
///     .build();
/// assert_eq!(settings.token_refill_ms, 100);
/// ```
#[derive(Clone, Debug, Builder)]
pub struct GeneratorSettings {
    /// Target average dispatch rate, in requests per second.
    ///
    /// The bucket is refilled with `target_qps * token_refill_ms / 1000`
    /// tokens per tick (scaled by the shaper factor), so the long-term
    /// average converges to this rate while individual ticks stay irregular.
    #[builder(default = 10.0)]
    pub target_qps: f64,

    /// Interval of the refill/drain tick, in milliseconds. Zero is treated
    /// as one.
    #[builder(default = 100)]
    pub token_refill_ms: u64,

    /// Maximum number of tokens the bucket can bank.
    ///
    /// Refill beyond capacity is discarded, which bounds how much backlog a
    /// pause/burst cycle can accumulate.
    #[builder(default = 200)]
    pub token_bucket_capacity: u32,

    /// Maximum number of simultaneously in-flight dispatches.
    #[builder(default = 100)]
    pub concurrency_limit: usize,

    /// Upper bound of the uniform random delay applied before each dispatch,
    /// in milliseconds. Zero disables jitter.
    #[builder(default = 150)]
    pub jitter_ms_max: u64,

    /// Whether burst windows may be entered at all.
    #[builder(default = true)]
    pub burst_enabled: bool,

    /// Probability, evaluated once per second, of entering a burst window.
    #[builder(default = 0.10)]
    pub burst_probability_per_second: f64,

    /// Minimum burst window duration, in milliseconds.
    #[builder(default = 800)]
    pub burst_duration_ms_min: u64,

    /// Maximum burst window duration, in milliseconds.
    #[builder(default = 1800)]
    pub burst_duration_ms_max: u64,

    /// Minimum rate multiplier while inside a burst window.
    #[builder(default = 2.0)]
    pub burst_factor_min: f64,

    /// Maximum rate multiplier while inside a burst window.
    #[builder(default = 4.0)]
    pub burst_factor_max: f64,

    /// Whether pause windows may be entered at all.
    #[builder(default = true)]
    pub pause_enabled: bool,

    /// Probability, evaluated once per second, of entering a pause window.
    ///
    /// The pause draw happens before the burst draw, so when both would fire
    /// in the same second the quiet period wins.
    #[builder(default = 0.06)]
    pub pause_probability_per_second: f64,

    /// Minimum pause window duration, in milliseconds.
    #[builder(default = 1200)]
    pub pause_duration_ms_min: u64,

    /// Maximum pause window duration, in milliseconds.
    #[builder(default = 4500)]
    pub pause_duration_ms_max: u64,

    /// Per-request timeout, in seconds. A timed-out request is logged as a
    /// failure and never retried.
    #[builder(default = 4)]
    pub request_timeout_secs: u64,

    /// Downstream endpoint receiving the generated `POST` traffic.
    #[builder(default = String::from("http://127.0.0.1:8080/push"))]
    pub endpoint_url: String,

    /// Cadence of the one-line run summary, in seconds. Zero disables it.
    #[builder(default = 10)]
    pub summary_interval_secs: u64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GeneratorSettings {
    /// Tokens added to the bucket per tick before shaping.
    pub fn base_tokens_per_tick(&self) -> f64 {
        self.target_qps * (self.token_refill_ms as f64 / 1000.0)
    }

    /// Reads settings from `LOAD_SHAPER_*` environment variables, falling
    /// back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            target_qps: env_or("LOAD_SHAPER_TARGET_QPS", d.target_qps),
            token_refill_ms: env_or("LOAD_SHAPER_TOKEN_REFILL_MS", d.token_refill_ms),
            token_bucket_capacity: env_or(
                "LOAD_SHAPER_TOKEN_BUCKET_CAPACITY",
                d.token_bucket_capacity,
            ),
            concurrency_limit: env_or("LOAD_SHAPER_CONCURRENCY_LIMIT", d.concurrency_limit),
            jitter_ms_max: env_or("LOAD_SHAPER_JITTER_MS_MAX", d.jitter_ms_max),
            burst_enabled: env_or("LOAD_SHAPER_BURST_ENABLED", d.burst_enabled),
            burst_probability_per_second: env_or(
                "LOAD_SHAPER_BURST_PROBABILITY_PER_SECOND",
                d.burst_probability_per_second,
            ),
            burst_duration_ms_min: env_or(
                "LOAD_SHAPER_BURST_DURATION_MS_MIN",
                d.burst_duration_ms_min,
            ),
            burst_duration_ms_max: env_or(
                "LOAD_SHAPER_BURST_DURATION_MS_MAX",
                d.burst_duration_ms_max,
            ),
            burst_factor_min: env_or("LOAD_SHAPER_BURST_FACTOR_MIN", d.burst_factor_min),
            burst_factor_max: env_or("LOAD_SHAPER_BURST_FACTOR_MAX", d.burst_factor_max),
            pause_enabled: env_or("LOAD_SHAPER_PAUSE_ENABLED", d.pause_enabled),
            pause_probability_per_second: env_or(
                "LOAD_SHAPER_PAUSE_PROBABILITY_PER_SECOND",
                d.pause_probability_per_second,
            ),
            pause_duration_ms_min: env_or(
                "LOAD_SHAPER_PAUSE_DURATION_MS_MIN",
                d.pause_duration_ms_min,
            ),
            pause_duration_ms_max: env_or(
                "LOAD_SHAPER_PAUSE_DURATION_MS_MAX",
                d.pause_duration_ms_max,
            ),
            request_timeout_secs: env_or(
                "LOAD_SHAPER_REQUEST_TIMEOUT_SECS",
                d.request_timeout_secs,
            ),
            endpoint_url: env_or("LOAD_SHAPER_ENDPOINT_URL", d.endpoint_url),
            summary_interval_secs: env_or(
                "LOAD_SHAPER_SUMMARY_INTERVAL_SECS",
                d.summary_interval_secs,
            ),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
