//! Subscribers registered by the node

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;

use market_data::TickSubscriber;
use types::tick::CanonicalTick;

/// Forwards ticks to UI listeners over a broadcast channel.
///
/// Having no listeners is not a failure; slow listeners lag and lose the
/// oldest ticks on their side only.
pub struct UiBroadcast {
    tx: broadcast::Sender<CanonicalTick>,
}

impl UiBroadcast {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    pub fn listen(&self) -> broadcast::Receiver<CanonicalTick> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl TickSubscriber for UiBroadcast {
    fn name(&self) -> &str {
        "ui-broadcast"
    }

    async fn on_tick(&self, tick: &CanonicalTick) -> anyhow::Result<()> {
        let _ = self.tx.send(tick.clone());
        Ok(())
    }
}

/// Counts ticks per symbol for the periodic stats line.
#[derive(Default)]
pub struct MetricsSink {
    counts: Mutex<HashMap<String, u64>>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `n` busiest symbols, most ticks first.
    pub fn top(&self, n: usize) -> Vec<(String, u64)> {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<(String, u64)> = counts.iter().map(|(s, c)| (s.clone(), *c)).collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        all.truncate(n);
        all
    }
}

#[async_trait]
impl TickSubscriber for MetricsSink {
    fn name(&self) -> &str {
        "metrics-sink"
    }

    async fn on_tick(&self, tick: &CanonicalTick) -> anyhow::Result<()> {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        *counts.entry(tick.symbol.clone()).or_insert(0) += 1;
        Ok(())
    }
}
