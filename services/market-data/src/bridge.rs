//! Tick ingestion bridge
//!
//! Hands raw ticks from the blocking network thread to a single async
//! dispatch loop through a bounded queue, then fans each normalized tick out
//! to every subscriber.
//!
//! Delivery is at-most-once. `submit` never waits: when the queue is full the
//! tick is dropped and counted, and that is the only backpressure relief.
//! Ticks still queued when the bridge stops are discarded, not flushed.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use arc_swap::{ArcSwap, ArcSwapOption};
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use types::instrument::InstrumentLookup;
use types::tick::{CanonicalTick, RawTick};

use crate::backpressure::{BandMonitor, BandThresholds, PressureBand};
use crate::config::BridgeConfig;
use crate::metrics::{BridgeMetrics, BridgeStats};
use crate::normalizer::{normalize, normalize_with_lookup};
use crate::subscriber::TickSubscriber;

/// A drop is logged at warn level once, then once per this many drops.
const DROP_WARN_EVERY: u64 = 1_000;

/// Errors from bridge lifecycle calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("queue capacity must be at least 1")]
    InvalidCapacity,

    #[error("bridge is already running")]
    AlreadyRunning,

    #[error("no tokio runtime available to run the dispatch loop")]
    NoRuntime,
}

/// Result of a single `submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The tick is queued for dispatch.
    Accepted,
    /// The tick was lost: queue full or bridge stopped.
    Dropped,
}

type Subscribers = Vec<Arc<dyn TickSubscriber>>;

/// State shared between the bridge handle, its submitters and the dispatch
/// loop.
struct Shared {
    config: BridgeConfig,
    thresholds: BandThresholds,
    /// None once the bridge is stopped; submits then drop.
    sender: ArcSwapOption<mpsc::Sender<RawTick>>,
    subscribers: ArcSwap<Subscribers>,
    lookup: Option<Arc<dyn InstrumentLookup>>,
    metrics: BridgeMetrics,
    /// Seen-order counter stamped into `CanonicalTick::seq`.
    seq: AtomicU64,
}

impl Shared {
    fn submit(&self, raw: RawTick) -> SubmitOutcome {
        let sender = self.sender.load();
        let sent = match sender.as_deref() {
            Some(tx) => tx.try_send(raw).is_ok(),
            None => false,
        };

        if sent {
            self.metrics.record_accepted();
            trace!("Tick queued");
            SubmitOutcome::Accepted
        } else {
            let dropped = self.metrics.record_dropped();
            trace!(dropped, "Tick dropped");
            if dropped == 1 || dropped % DROP_WARN_EVERY == 0 {
                warn!(
                    dropped,
                    capacity = self.config.queue_capacity,
                    "Tick queue full or bridge stopped, dropping ticks"
                );
            }
            SubmitOutcome::Dropped
        }
    }

    fn queue_depth(&self) -> usize {
        match self.sender.load().as_deref() {
            Some(tx) => tx.max_capacity() - tx.capacity(),
            None => 0,
        }
    }

    /// Normalize one raw tick and deliver it to every subscriber.
    async fn dispatch(&self, raw: RawTick) {
        let started = Instant::now();

        let normalized = match &self.lookup {
            Some(lookup) => normalize_with_lookup(&raw, lookup.as_ref()),
            None => normalize(&raw),
        };
        let mut tick = match normalized {
            Ok(tick) => tick,
            Err(reason) => {
                self.metrics.record_invalid(&reason);
                debug!(reason = reason.code(), "Discarding invalid tick");
                return;
            }
        };
        tick.seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;

        let subscribers = self.subscribers.load_full();
        join_all(subscribers.iter().map(|sub| self.deliver(sub.as_ref(), &tick))).await;

        self.metrics
            .record_broadcast(started.elapsed().as_nanos() as u64);
    }

    /// Run one subscriber, isolating its errors, panics and timeouts.
    async fn deliver(&self, subscriber: &dyn TickSubscriber, tick: &CanonicalTick) {
        let call = AssertUnwindSafe(subscriber.on_tick(tick)).catch_unwind();

        let outcome = match self.config.subscriber_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.metrics.record_subscriber_timeout();
                    warn!(
                        subscriber = subscriber.name(),
                        seq = tick.seq,
                        timeout_ms = limit.as_millis() as u64,
                        "Subscriber timed out, tick abandoned for it"
                    );
                    return;
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.metrics.record_subscriber_failure();
                warn!(
                    subscriber = subscriber.name(),
                    seq = tick.seq,
                    error = %err,
                    "Subscriber failed"
                );
            }
            Err(_) => {
                self.metrics.record_subscriber_failure();
                error!(
                    subscriber = subscriber.name(),
                    seq = tick.seq,
                    "Subscriber panicked"
                );
            }
        }
    }
}

/// Single consumer of the queue.
///
/// Wakes at least once per `poll_interval` to re-check queue pressure.
/// Returns the receiver so `stop` can count what was left behind.
async fn dispatch_loop(
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<RawTick>,
    mut shutdown: watch::Receiver<bool>,
) -> mpsc::Receiver<RawTick> {
    let mut monitor = BandMonitor::new(shared.thresholds);
    let capacity = shared.config.queue_capacity;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            next = tokio::time::timeout(shared.config.poll_interval, rx.recv()) => match next {
                Ok(Some(raw)) => shared.dispatch(raw).await,
                Ok(None) => break,
                Err(_) => trace!("Dispatch loop idle"),
            },
        }

        monitor.observe(shared.queue_depth(), capacity);
    }

    debug!(critical_episodes = monitor.critical_episodes(), "Dispatch loop exited");
    rx
}

enum BridgeState {
    /// Queue exists and accepts ticks; nothing is consuming it yet.
    Idle { rx: mpsc::Receiver<RawTick> },
    Running {
        shutdown: watch::Sender<bool>,
        task: JoinHandle<mpsc::Receiver<RawTick>>,
    },
    Stopped,
}

/// Cloneable handle for the producer thread.
///
/// `submit` is synchronous and never blocks, so it is safe to call from a
/// plain OS thread with no runtime.
#[derive(Clone)]
pub struct TickSubmitter {
    shared: Arc<Shared>,
}

impl TickSubmitter {
    pub fn submit(&self, raw: RawTick) -> SubmitOutcome {
        self.shared.submit(raw)
    }
}

/// Bounded queue plus fan-out dispatch loop.
pub struct TickBridge {
    shared: Arc<Shared>,
    state: Mutex<BridgeState>,
}

impl TickBridge {
    /// Create a bridge with an empty queue. Call `start` to begin dispatch.
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        Self::build(config, None)
    }

    /// Create a bridge that resolves token-only ticks through `lookup`.
    pub fn with_lookup(
        config: BridgeConfig,
        lookup: Arc<dyn InstrumentLookup>,
    ) -> Result<Self, BridgeError> {
        Self::build(config, Some(lookup))
    }

    fn build(
        config: BridgeConfig,
        lookup: Option<Arc<dyn InstrumentLookup>>,
    ) -> Result<Self, BridgeError> {
        if config.queue_capacity == 0 {
            return Err(BridgeError::InvalidCapacity);
        }

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        info!(
            queue_capacity = config.queue_capacity,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            subscriber_timeout_ms = config.subscriber_timeout.map(|t| t.as_millis() as u64),
            resolves_tokens = lookup.is_some(),
            "Tick bridge created"
        );

        let shared = Shared {
            thresholds: BandThresholds {
                warning_pct: config.warning_pct,
                critical_pct: config.critical_pct,
            },
            metrics: BridgeMetrics::new(config.latency_window),
            config,
            sender: ArcSwapOption::from_pointee(tx),
            subscribers: ArcSwap::from_pointee(Vec::new()),
            lookup,
            seq: AtomicU64::new(0),
        };

        Ok(Self {
            shared: Arc::new(shared),
            state: Mutex::new(BridgeState::Idle { rx }),
        })
    }

    /// A handle the network thread can own.
    pub fn submitter(&self) -> TickSubmitter {
        TickSubmitter {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Non-blocking enqueue. See [`TickSubmitter::submit`].
    pub fn submit(&self, raw: RawTick) -> SubmitOutcome {
        self.shared.submit(raw)
    }

    /// Register a consumer. Takes effect from the next dispatched tick.
    pub fn subscribe(&self, subscriber: Arc<dyn TickSubscriber>) {
        info!(subscriber = subscriber.name(), "Subscriber registered");
        self.shared.subscribers.rcu(|current| {
            let mut next = Subscribers::clone(current);
            next.push(Arc::clone(&subscriber));
            next
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.load().len()
    }

    /// Spawn the dispatch loop on the current tokio runtime.
    ///
    /// A stopped bridge starts again with a fresh, empty queue.
    pub fn start(&self) -> Result<(), BridgeError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BridgeError::NoRuntime)?;
        let mut state = self.lock_state();

        let rx = match std::mem::replace(&mut *state, BridgeState::Stopped) {
            BridgeState::Idle { rx } => rx,
            BridgeState::Stopped => {
                let (tx, rx) = mpsc::channel(self.shared.config.queue_capacity);
                self.shared.sender.store(Some(Arc::new(tx)));
                rx
            }
            running @ BridgeState::Running { .. } => {
                *state = running;
                return Err(BridgeError::AlreadyRunning);
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = runtime.spawn(dispatch_loop(Arc::clone(&self.shared), rx, shutdown_rx));
        *state = BridgeState::Running { shutdown, task };

        info!(
            subscribers = self.subscriber_count(),
            queued = self.shared.queue_depth(),
            "Tick bridge started"
        );
        Ok(())
    }

    /// Stop dispatching and discard whatever is still queued.
    ///
    /// In-flight subscriber calls get `stop_grace` to finish before the loop
    /// is aborted. Safe to call at any time, any number of times.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), BridgeState::Stopped);

        let discarded = match previous {
            BridgeState::Stopped => return,
            BridgeState::Idle { rx } => {
                self.shared.sender.store(None);
                drain(rx)
            }
            BridgeState::Running { shutdown, mut task } => {
                // The loop also exits if the sender is dropped
                let _ = shutdown.send(true);

                match tokio::time::timeout(self.shared.config.stop_grace, &mut task).await {
                    Ok(Ok(rx)) => {
                        self.shared.sender.store(None);
                        drain(rx)
                    }
                    Ok(Err(join_err)) => {
                        error!(error = %join_err, "Dispatch loop terminated abnormally");
                        let depth = self.shared.queue_depth() as u64;
                        self.shared.sender.store(None);
                        depth
                    }
                    Err(_) => {
                        warn!(
                            grace_ms = self.shared.config.stop_grace.as_millis() as u64,
                            "Subscribers still running after grace period, aborting dispatch"
                        );
                        let depth = self.shared.queue_depth() as u64;
                        self.shared.sender.store(None);
                        task.abort();
                        depth
                    }
                }
            }
        };

        self.shared.metrics.record_discarded(discarded);
        let stats = self.stats();
        info!(
            discarded,
            received = stats.received,
            dropped = stats.dropped,
            broadcast = stats.broadcast,
            invalid = stats.invalid,
            "Tick bridge stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock_state(), BridgeState::Running { .. })
    }

    /// Counter snapshot. Read-only.
    pub fn stats(&self) -> BridgeStats {
        let depth = self.shared.queue_depth();
        let capacity = self.shared.config.queue_capacity;
        let band: PressureBand = self.shared.thresholds.classify(depth, capacity);
        self.shared.metrics.snapshot(depth, capacity, band)
    }

    /// Flat counter map for metrics exposition.
    pub fn export(&self) -> std::collections::BTreeMap<String, u64> {
        let mut m = self.shared.metrics.export();
        m.insert("queue_depth".to_string(), self.shared.queue_depth() as u64);
        m.insert(
            "queue_capacity".to_string(),
            self.shared.config.queue_capacity as u64,
        );
        m
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    fn lock_state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TickBridge {
    fn drop(&mut self) {
        if let BridgeState::Running { shutdown, .. } = &*self.lock_state() {
            let _ = shutdown.send(true);
        }
    }
}

/// Close the queue to new sends and count what was left in it.
fn drain(mut rx: mpsc::Receiver<RawTick>) -> u64 {
    rx.close();
    let mut discarded = 0;
    while rx.try_recv().is_ok() {
        discarded += 1;
    }
    discarded
}
