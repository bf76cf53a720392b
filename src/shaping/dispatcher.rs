use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::GeneratorSettings;
use super::bucket::TokenBucket;
use super::gate::ConcurrencyGate;
use super::random::{RandomSource, SmallRngSource};
use super::sender::{DispatchBody, RequestSender};
use super::shaper::TrafficShaper;
use super::stats::DispatchStats;

/// Fixed synthetic payload amount carried by every generated request.
const DISPATCH_AMOUNT: i64 = 100;

/// Ephemeral per-request bookkeeping, created at drain time and dropped when
/// the dispatch completes.
#[derive(Debug)]
struct DispatchRecord {
    req_id: String,
    jitter_ms: u64,
}

struct Inner<S, R> {
    settings: GeneratorSettings,
    bucket: TokenBucket,
    gate: ConcurrencyGate,
    shaper: Mutex<TrafficShaper<R>>,
    rng: Mutex<R>,
    sender: S,
    stats: DispatchStats,
    sequence: AtomicU64,
    drain_lock: Arc<tokio::sync::Mutex<()>>,
}

/// The orchestrator: owns the bucket, gate and shaper, and runs the two
/// periodic schedules that drive them.
///
/// Per refill tick: read the shaper factor, refill the bucket with
/// `base_tokens_per_tick * factor`, then drain — one spawned request task
/// per consumed token, until either the bucket runs dry or the gate
/// saturates (in which case the last token is refunded and the remainder of
/// the drain is deferred to a later tick).
///
/// The drain runs on a spawned task behind a `try_lock`, so jitter sleeps
/// and slow sends never delay the timer and at most one drain executes at a
/// time.
pub struct Dispatcher<S: RequestSender, R: RandomSource = SmallRngSource> {
    inner: Arc<Inner<S, R>>,
}

/// Controls a running generator. Dropping the handle also stops the loops
/// (the shutdown channel closes); prefer [`shutdown`](Self::shutdown) to
/// wait for them to wind down.
pub struct GeneratorHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl GeneratorHandle {
    /// Stops the timers and the summary loop. In-flight requests are
    /// abandoned to their own timeouts; their gate permits still release on
    /// completion.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        join_all(self.tasks).await;
    }
}

impl<S: RequestSender> Dispatcher<S, SmallRngSource> {
    pub fn new(settings: GeneratorSettings, sender: S) -> Self {
        let shaper = TrafficShaper::new(&settings);
        Self::assemble(settings, sender, shaper, SmallRngSource::new())
    }
}

impl<S: RequestSender, R: RandomSource> Dispatcher<S, R> {
    /// Builds a dispatcher with injected randomness for the shaper and for
    /// jitter/id draws.
    pub fn with_random(settings: GeneratorSettings, sender: S, shaper_rng: R, dispatch_rng: R) -> Self {
        let shaper = TrafficShaper::with_random(&settings, shaper_rng);
        Self::assemble(settings, sender, shaper, dispatch_rng)
    }

    fn assemble(
        mut settings: GeneratorSettings,
        sender: S,
        shaper: TrafficShaper<R>,
        dispatch_rng: R,
    ) -> Self {
        // A zero interval would tick at 1 ms yet refill nothing; clamp it so
        // the refill math and the timer agree.
        settings.token_refill_ms = settings.token_refill_ms.max(1);
        let bucket = TokenBucket::new(settings.token_bucket_capacity);
        let gate = ConcurrencyGate::new(settings.concurrency_limit);
        Self {
            inner: Arc::new(Inner {
                settings,
                bucket,
                gate,
                shaper: Mutex::new(shaper),
                rng: Mutex::new(dispatch_rng),
                sender,
                stats: DispatchStats::new(),
                sequence: AtomicU64::new(0),
                drain_lock: Arc::new(tokio::sync::Mutex::new(())),
            }),
        }
    }

    /// Starts the per-second shaper evaluation, the refill/drain tick and
    /// the optional summary loop on the current runtime.
    pub fn spawn(self) -> GeneratorHandle {
        let inner = self.inner;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            endpoint = %inner.settings.endpoint_url,
            target_qps = inner.settings.target_qps,
            concurrency_limit = inner.settings.concurrency_limit,
            token_refill_ms = inner.settings.token_refill_ms,
            token_bucket_capacity = inner.settings.token_bucket_capacity,
            jitter_ms_max = inner.settings.jitter_ms_max,
            "load generator started"
        );

        let mut tasks = Vec::new();

        // Shaper evaluation: strictly sequential, once per second.
        {
            let inner = Arc::clone(&inner);
            let mut shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(1));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => inner.shaper.lock().unwrap().maybe_switch(),
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        // Refill + drain: the refill step runs on the timer, the drain on a
        // spawned task so the next tick is never delayed.
        {
            let inner = Arc::clone(&inner);
            let mut shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                let period = Duration::from_millis(inner.settings.token_refill_ms);
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            Self::refill(&inner);
                            match Arc::clone(&inner.drain_lock).try_lock_owned() {
                                Ok(guard) => {
                                    let inner = Arc::clone(&inner);
                                    tokio::spawn(async move {
                                        let _guard = guard;
                                        Self::drain(&inner).await;
                                    });
                                }
                                // Previous drain still running; the refilled
                                // tokens wait for it or for the next tick.
                                Err(_) => debug!("drain still in progress; skipping"),
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        if inner.settings.summary_interval_secs > 0 {
            let inner = Arc::clone(&inner);
            let mut shutdown = shutdown_rx;
            tasks.push(tokio::spawn(async move {
                let period = Duration::from_secs(inner.settings.summary_interval_secs);
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // The first tick fires immediately; skip it so the first
                // summary covers a full interval.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            inner.stats.emit_summary(inner.gate.in_flight(), inner.bucket.level());
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        GeneratorHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }

    /// One shaper evaluation, as the per-second loop would run it.
    pub fn evaluate_shaper(&self) {
        self.inner.shaper.lock().unwrap().maybe_switch();
    }

    /// One refill + drain cycle, run inline. This is the tick body the
    /// spawned loops execute; exposed for embedding and deterministic tests.
    pub async fn tick_once(&self) {
        Self::refill(&self.inner);
        let _guard = self.inner.drain_lock.lock().await;
        Self::drain(&self.inner).await;
    }

    /// Run counters for this dispatcher.
    pub fn stats(&self) -> &DispatchStats {
        &self.inner.stats
    }

    /// Current token balance.
    pub fn bucket_level(&self) -> f64 {
        self.inner.bucket.level()
    }

    /// Requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.gate.in_flight()
    }

    fn refill(inner: &Inner<S, R>) {
        let factor = inner.shaper.lock().unwrap().current_factor();
        let tokens_to_add = inner.settings.base_tokens_per_tick() * factor;
        inner.bucket.add(tokens_to_add);
    }

    /// Consumes tokens and launches one request task per token until the
    /// bucket runs dry or the gate saturates.
    ///
    /// Jitter sleeps happen here, on the drain worker, which staggers the
    /// issue times within a tick without ever touching the timer.
    async fn drain(inner: &Arc<Inner<S, R>>) {
        while inner.bucket.try_consume_one() {
            let Some(permit) = inner.gate.try_acquire() else {
                // Gate saturated: hand the token back so no rate is lost,
                // and defer the remainder of this drain to a later tick.
                inner.bucket.add(1.0);
                inner.stats.record_refund();
                debug!("concurrency gate saturated; token refunded");
                break;
            };

            let record = Self::open_record(inner);
            if record.jitter_ms > 0 {
                tokio::time::sleep(Duration::from_millis(record.jitter_ms)).await;
            }
            inner.stats.record_issued();

            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                let _permit = permit;
                Self::dispatch_one(&inner, record).await;
            });
        }
    }

    fn open_record(inner: &Inner<S, R>) -> DispatchRecord {
        let sequence = inner.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let mut rng = inner.rng.lock().unwrap();
        let suffix = rng.range_u64(0, u64::from(u32::MAX)) as u32;
        let jitter_ms = if inner.settings.jitter_ms_max > 0 {
            rng.range_u64(0, inner.settings.jitter_ms_max)
        } else {
            0
        };
        DispatchRecord {
            req_id: format!("{sequence}-{suffix:08x}"),
            jitter_ms,
        }
    }

    async fn dispatch_one(inner: &Inner<S, R>, record: DispatchRecord) {
        let issued_at = Instant::now();
        let body = DispatchBody {
            req_id: record.req_id.clone(),
            amt: DISPATCH_AMOUNT,
            ts: epoch_millis(),
        };

        let result = inner.sender.send(body).await;
        let elapsed_ms = issued_at.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                inner.stats.record_success(elapsed_ms);
                info!(req_id = %record.req_id, elapsed_ms, "request ok");
            }
            Err(err) => {
                inner.stats.record_failure(elapsed_ms);
                warn!(req_id = %record.req_id, elapsed_ms, error = %err, "request failed");
            }
        }
        // The gate permit drops with the task, releasing exactly once.
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
