//! Bridge counters and dispatch latency
//!
//! Every degraded path in the bridge (queue full, invalid tick, failing
//! subscriber) ends in one of these counters. They are the observability
//! contract: the bridge itself never alerts.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use types::errors::TickRejection;

use crate::backpressure::{utilization_pct, PressureBand};

/// Core counters for one bridge instance.
pub struct BridgeMetrics {
    // Producer side
    pub accepted: AtomicU64,
    pub dropped: AtomicU64,

    // Dispatch side
    pub broadcast: AtomicU64,
    pub invalid_missing_symbol: AtomicU64,
    pub invalid_unresolved_token: AtomicU64,
    pub subscriber_failures: AtomicU64,
    pub subscriber_timeouts: AtomicU64,
    pub discarded_on_stop: AtomicU64,
    pub dispatch_latency_ns: Mutex<LatencyTracker>,
}

impl BridgeMetrics {
    pub fn new(latency_window: usize) -> Self {
        Self {
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            broadcast: AtomicU64::new(0),
            invalid_missing_symbol: AtomicU64::new(0),
            invalid_unresolved_token: AtomicU64::new(0),
            subscriber_failures: AtomicU64::new(0),
            subscriber_timeouts: AtomicU64::new(0),
            discarded_on_stop: AtomicU64::new(0),
            dispatch_latency_ns: Mutex::new(LatencyTracker::new(latency_window)),
        }
    }

    /// Record a tick that entered the queue. Returns the new total.
    pub fn record_accepted(&self) -> u64 {
        self.accepted.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a tick lost at submit. Returns the new total.
    pub fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_invalid(&self, reason: &TickRejection) {
        let counter = match reason {
            TickRejection::MissingSymbol => &self.invalid_missing_symbol,
            TickRejection::UnresolvedToken { .. } => &self.invalid_unresolved_token,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscriber_failure(&self) {
        self.subscriber_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscriber_timeout(&self) {
        self.subscriber_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed fan-out of one tick.
    pub fn record_broadcast(&self, latency_ns: u64) {
        self.broadcast.fetch_add(1, Ordering::Relaxed);
        self.dispatch_latency_ns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(latency_ns);
    }

    pub fn record_discarded(&self, count: u64) {
        self.discarded_on_stop.fetch_add(count, Ordering::Relaxed);
    }

    pub fn invalid(&self) -> u64 {
        self.invalid_missing_symbol.load(Ordering::Relaxed)
            + self.invalid_unresolved_token.load(Ordering::Relaxed)
    }

    /// Point-in-time snapshot, combined with the queue state supplied by the
    /// bridge.
    pub fn snapshot(
        &self,
        queue_depth: usize,
        queue_capacity: usize,
        band: PressureBand,
    ) -> BridgeStats {
        let accepted = self.accepted.load(Ordering::Relaxed);
        let dropped = self.dropped.load(Ordering::Relaxed);
        let (p50, p99) = {
            let tracker = self
                .dispatch_latency_ns
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            (tracker.percentile(50), tracker.percentile(99))
        };

        BridgeStats {
            // Every submit either enqueues or drops, so the sum is exact.
            received: accepted + dropped,
            accepted,
            dropped,
            broadcast: self.broadcast.load(Ordering::Relaxed),
            invalid: self.invalid(),
            subscriber_failures: self.subscriber_failures.load(Ordering::Relaxed),
            subscriber_timeouts: self.subscriber_timeouts.load(Ordering::Relaxed),
            discarded_on_stop: self.discarded_on_stop.load(Ordering::Relaxed),
            queue_depth,
            queue_capacity,
            utilization: utilization_pct(queue_depth, queue_capacity),
            band,
            dispatch_p50_ns: p50,
            dispatch_p99_ns: p99,
        }
    }

    /// Export counters as a flat map for metrics exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let accepted = load(&self.accepted);
        let dropped = load(&self.dropped);
        m.insert("ticks_received".to_string(), accepted + dropped);
        m.insert("ticks_accepted".to_string(), accepted);
        m.insert("ticks_dropped".to_string(), dropped);
        m.insert("ticks_broadcast".to_string(), load(&self.broadcast));
        m.insert(
            "ticks_invalid_missing_symbol".to_string(),
            load(&self.invalid_missing_symbol),
        );
        m.insert(
            "ticks_invalid_unresolved_token".to_string(),
            load(&self.invalid_unresolved_token),
        );
        m.insert("subscriber_failures".to_string(), load(&self.subscriber_failures));
        m.insert("subscriber_timeouts".to_string(), load(&self.subscriber_timeouts));
        m.insert("ticks_discarded_on_stop".to_string(), load(&self.discarded_on_stop));
        m
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Read-only snapshot returned by `TickBridge::stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeStats {
    /// Every `submit` call.
    pub received: u64,
    /// Ticks that entered the queue.
    pub accepted: u64,
    /// Ticks lost because the queue was full or the bridge was stopped.
    pub dropped: u64,
    /// Ticks fanned out to subscribers.
    pub broadcast: u64,
    /// Ticks the normalizer rejected.
    pub invalid: u64,
    pub subscriber_failures: u64,
    pub subscriber_timeouts: u64,
    /// Ticks still queued when the bridge stopped.
    pub discarded_on_stop: u64,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    /// Queue occupancy in percent.
    pub utilization: f64,
    pub band: PressureBand,
    pub dispatch_p50_ns: Option<u64>,
    pub dispatch_p99_ns: Option<u64>,
}

/// Tracks latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: VecDeque<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    /// Record a latency sample, evicting the oldest once the window is full.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (p as f64 / 100.0 * (sorted.len() - 1) as f64) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }
}
