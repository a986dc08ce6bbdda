//! Bridge configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the tick bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum number of raw ticks waiting for dispatch.
    pub queue_capacity: usize,
    /// How long the dispatch loop waits for a tick before a liveness check.
    pub poll_interval: Duration,
    /// Bound on how long `stop()` waits for in-flight subscribers.
    pub stop_grace: Duration,
    /// Per-subscriber deadline for one tick. None waits indefinitely.
    pub subscriber_timeout: Option<Duration>,
    /// Queue utilization (percent) at which the warning band starts.
    pub warning_pct: f64,
    /// Queue utilization (percent) above which the critical band starts.
    pub critical_pct: f64,
    /// Dispatch latency samples kept for percentiles.
    pub latency_window: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            poll_interval: Duration::from_secs(1),
            stop_grace: Duration::from_secs(2),
            subscriber_timeout: None,
            warning_pct: 80.0,
            critical_pct: 95.0,
            latency_window: 1_000,
        }
    }
}

impl BridgeConfig {
    /// Defaults overlaid with `FEED_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("FEED_QUEUE_CAPACITY") {
            config.queue_capacity = v.parse().unwrap_or(config.queue_capacity);
        }
        if let Ok(v) = std::env::var("FEED_POLL_INTERVAL_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                config.poll_interval = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = std::env::var("FEED_STOP_GRACE_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                config.stop_grace = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = std::env::var("FEED_SUBSCRIBER_TIMEOUT_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                config.subscriber_timeout = (ms > 0).then(|| Duration::from_millis(ms));
            }
        }
        if let Ok(v) = std::env::var("FEED_WARNING_PCT") {
            config.warning_pct = v.parse().unwrap_or(config.warning_pct);
        }
        if let Ok(v) = std::env::var("FEED_CRITICAL_PCT") {
            config.critical_pct = v.parse().unwrap_or(config.critical_pct);
        }

        config
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_subscriber_timeout(mut self, timeout: Duration) -> Self {
        self.subscriber_timeout = Some(timeout);
        self
    }
}
