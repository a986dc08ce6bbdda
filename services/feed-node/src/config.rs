use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use instrument_catalog::CatalogConfig;
use market_data::BridgeConfig;
use rate_limit::{CallClass, RateLimitConfig};
use types::exchange::Exchange;

/// Feed node: reads JSON ticks on stdin and fans them out to subscribers.
#[derive(Parser, Debug, Clone)]
#[command(name = "feed-node")]
#[command(about = "Market tick ingestion node")]
pub struct Config {
    /// Scrip master file, or a directory holding cached copies (newest wins)
    #[arg(long, env = "CATALOG_PATH")]
    pub catalog_path: Option<PathBuf>,

    /// Exchange searched when a lookup does not name one
    /// [env: CATALOG_PREFERRED_EXCHANGE]
    #[arg(long)]
    pub preferred_exchange: Option<String>,

    /// Catalog refresh interval in seconds
    #[arg(long, env = "CATALOG_REFRESH_SECS", default_value_t = 24 * 60 * 60)]
    pub refresh_secs: u64,

    /// [env: FEED_QUEUE_CAPACITY]
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// [env: FEED_POLL_INTERVAL_MS]
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// [env: FEED_STOP_GRACE_MS]
    #[arg(long)]
    pub stop_grace_ms: Option<u64>,

    /// Per-subscriber delivery timeout; 0 disables it [env: FEED_SUBSCRIBER_TIMEOUT_MS]
    #[arg(long)]
    pub subscriber_timeout_ms: Option<u64>,

    /// Seconds between stats log lines
    #[arg(long, env = "FEED_STATS_SECS", default_value_t = 10)]
    pub stats_secs: u64,

    /// Buffered ticks per UI listener before it starts lagging
    #[arg(long, env = "FEED_UI_BUFFER", default_value_t = 1_024)]
    pub ui_buffer: usize,

    /// [env: RATE_LIMIT_HISTORICAL_RATE]
    #[arg(long)]
    pub historical_rate: Option<f64>,

    /// [env: RATE_LIMIT_HISTORICAL_BURST]
    #[arg(long)]
    pub historical_burst: Option<u32>,

    /// [env: RATE_LIMIT_ORDER_RATE]
    #[arg(long)]
    pub order_rate: Option<f64>,

    /// [env: RATE_LIMIT_ORDER_BURST]
    #[arg(long)]
    pub order_burst: Option<u32>,

    /// [env: RATE_LIMIT_QUOTE_RATE]
    #[arg(long)]
    pub quote_rate: Option<f64>,

    /// [env: RATE_LIMIT_QUOTE_BURST]
    #[arg(long)]
    pub quote_burst: Option<u32>,
}

// Component settings start from each library's `from_env`; flags given on
// the command line win over the environment.
impl Config {
    pub fn bridge(&self) -> BridgeConfig {
        let mut config = BridgeConfig::from_env();
        if let Some(capacity) = self.queue_capacity {
            config = config.with_queue_capacity(capacity);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.stop_grace_ms {
            config.stop_grace = Duration::from_millis(ms);
        }
        match self.subscriber_timeout_ms {
            Some(0) => config.subscriber_timeout = None,
            Some(ms) => config = config.with_subscriber_timeout(Duration::from_millis(ms)),
            None => {}
        }
        config
    }

    pub fn catalog(&self) -> CatalogConfig {
        let mut config = CatalogConfig::from_env();
        if let Some(exchange) = &self.preferred_exchange {
            config.preferred_exchange = Exchange::parse(exchange);
        }
        config
    }

    pub fn rate_limits(&self) -> RateLimitConfig {
        let mut config = RateLimitConfig::from_env();
        let flags = [
            (CallClass::Historical, self.historical_rate, self.historical_burst),
            (CallClass::OrderPlacement, self.order_rate, self.order_burst),
            (CallClass::Quote, self.quote_rate, self.quote_burst),
        ];
        for (class, rate, burst) in flags {
            let mut bucket = config.get(class);
            bucket.rate = rate.unwrap_or(bucket.rate);
            bucket.capacity = burst.unwrap_or(bucket.capacity);
            config.set(class, bucket);
        }
        config
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs.max(1))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_secs.max(1))
    }
}
