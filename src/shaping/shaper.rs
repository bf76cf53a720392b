use std::time::Duration;

use tokio::time::Instant;

use super::GeneratorSettings;
use super::random::{RandomSource, SmallRngSource};

/// Which shaping window, if any, is currently active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaperMode {
    /// No window; the rate factor is 1.
    Normal,
    /// Elevated rate; the factor was drawn from the configured burst range.
    Burst,
    /// Quiet period; the factor is 0 and no new tokens accrue.
    Pause,
}

/// Stochastic burst/pause state machine producing a multiplicative rate
/// factor.
///
/// Evaluated once per second via [`maybe_switch`](Self::maybe_switch); while
/// a window is active the evaluation is skipped entirely, so windows never
/// stack or overlap. Expiry is lazy: the first
/// [`current_factor`](Self::current_factor) read past `active_until` resets
/// the state to [`ShaperMode::Normal`], and repeated reads are idempotent.
///
/// The state is an owned value, guarded by whatever lock its owner chooses;
/// there are no ambient globals. Randomness comes through the injected
/// [`RandomSource`].
#[derive(Debug)]
pub struct TrafficShaper<R = SmallRngSource> {
    burst_enabled: bool,
    burst_probability: f64,
    burst_duration_ms: (u64, u64),
    burst_factor: (f64, f64),

    pause_enabled: bool,
    pause_probability: f64,
    pause_duration_ms: (u64, u64),

    mode: ShaperMode,
    factor: f64,
    active_until: Option<Instant>,

    rng: R,
}

impl TrafficShaper<SmallRngSource> {
    pub fn new(settings: &GeneratorSettings) -> Self {
        Self::with_random(settings, SmallRngSource::new())
    }
}

impl<R: RandomSource> TrafficShaper<R> {
    /// Builds a shaper drawing randomness from `rng`.
    ///
    /// Misconfigured ranges are repaired rather than rejected: probabilities
    /// clamp to `[0, 1]`, and any range with `max < min` becomes
    /// `min..=min + 1`.
    pub fn with_random(settings: &GeneratorSettings, rng: R) -> Self {
        Self {
            burst_enabled: settings.burst_enabled,
            burst_probability: settings.burst_probability_per_second.clamp(0.0, 1.0),
            burst_duration_ms: sane_range_u64(
                settings.burst_duration_ms_min,
                settings.burst_duration_ms_max,
            ),
            burst_factor: sane_range_f64(settings.burst_factor_min, settings.burst_factor_max),
            pause_enabled: settings.pause_enabled,
            pause_probability: settings.pause_probability_per_second.clamp(0.0, 1.0),
            pause_duration_ms: sane_range_u64(
                settings.pause_duration_ms_min,
                settings.pause_duration_ms_max,
            ),
            mode: ShaperMode::Normal,
            factor: 1.0,
            active_until: None,
            rng,
        }
    }

    /// Returns the current rate factor, lazily expiring a finished window.
    ///
    /// Safe to poll repeatedly: once a window has expired this always
    /// returns 1 and never re-triggers a mode change (mode changes happen
    /// only in [`maybe_switch`](Self::maybe_switch)).
    pub fn current_factor(&mut self) -> f64 {
        if let Some(until) = self.active_until {
            if Instant::now() >= until {
                self.reset();
            }
        }
        self.factor
    }

    /// Once-per-second evaluation of whether to enter a burst or pause
    /// window. A no-op while a window is still active.
    ///
    /// The pause draw comes first and short-circuits the burst draw, so a
    /// second in which both would fire becomes a pause: quiet periods are
    /// the rarer, strictly dominant event.
    pub fn maybe_switch(&mut self) {
        let now = Instant::now();
        if let Some(until) = self.active_until {
            if now < until {
                return;
            }
            self.reset();
        }

        if self.pause_enabled && self.rng.unit() < self.pause_probability {
            let (min, max) = self.pause_duration_ms;
            let duration = self.rng.range_u64(min, max);
            self.mode = ShaperMode::Pause;
            self.factor = 0.0;
            self.active_until = Some(now + Duration::from_millis(duration));
            debug!(duration_ms = duration, "entering pause window");
            return;
        }

        if self.burst_enabled && self.rng.unit() < self.burst_probability {
            let (dmin, dmax) = self.burst_duration_ms;
            let duration = self.rng.range_u64(dmin, dmax);
            let (fmin, fmax) = self.burst_factor;
            let factor = self.rng.range_f64(fmin, fmax);
            self.mode = ShaperMode::Burst;
            self.factor = factor;
            self.active_until = Some(now + Duration::from_millis(duration));
            debug!(duration_ms = duration, factor, "entering burst window");
        }
    }

    /// Current mode, without expiring anything.
    pub fn mode(&self) -> ShaperMode {
        self.mode
    }

    fn reset(&mut self) {
        self.mode = ShaperMode::Normal;
        self.factor = 1.0;
        self.active_until = None;
    }
}

fn sane_range_u64(min: u64, max: u64) -> (u64, u64) {
    if max < min { (min, min + 1) } else { (min, max) }
}

fn sane_range_f64(min: f64, max: f64) -> (f64, f64) {
    if max < min { (min, min + 1.0) } else { (min, max) }
}
