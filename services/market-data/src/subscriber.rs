//! Downstream tick consumers

use std::future::Future;

use async_trait::async_trait;

use types::tick::CanonicalTick;

/// A consumer registered on the bridge.
///
/// `on_tick` is called from the dispatch loop, concurrently with the other
/// subscribers but never concurrently with itself. An `Err` or a panic is
/// counted against the subscriber and does not affect anyone else.
#[async_trait]
pub trait TickSubscriber: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &str;

    async fn on_tick(&self, tick: &CanonicalTick) -> anyhow::Result<()>;
}

/// Adapts a closure returning a future into a subscriber.
///
/// The closure receives an owned tick so the future can hold it across
/// awaits.
pub struct FnSubscriber<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnSubscriber<F>
where
    F: Fn(CanonicalTick) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> TickSubscriber for FnSubscriber<F>
where
    F: Fn(CanonicalTick) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_tick(&self, tick: &CanonicalTick) -> anyhow::Result<()> {
        (self.f)(tick.clone()).await
    }
}
