//! Per-call-class limits
//!
//! The broker publishes a separate ceiling for each API family. A
//! `BrokerLimits` set builds one bucket per family from configuration and
//! hands each call site the bucket for its class.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::bucket::TokenBucket;
use crate::error::RateLimitError;

/// Outbound broker call families with distinct contractual limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallClass {
    /// Historical candle downloads
    Historical,
    /// Order placement, modification and cancellation
    OrderPlacement,
    /// Quote / LTP snapshots
    Quote,
}

impl CallClass {
    pub const ALL: [CallClass; 3] = [
        CallClass::Historical,
        CallClass::OrderPlacement,
        CallClass::Quote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallClass::Historical => "historical",
            CallClass::OrderPlacement => "order_placement",
            CallClass::Quote => "quote",
        }
    }

    fn env_prefix(&self) -> &'static str {
        match self {
            CallClass::Historical => "RATE_LIMIT_HISTORICAL",
            CallClass::OrderPlacement => "RATE_LIMIT_ORDER",
            CallClass::Quote => "RATE_LIMIT_QUOTE",
        }
    }
}

impl fmt::Display for CallClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refill rate and burst for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Tokens per second.
    pub rate: f64,
    /// Maximum burst.
    pub capacity: u32,
}

impl BucketConfig {
    pub const fn new(rate: f64, capacity: u32) -> Self {
        Self { rate, capacity }
    }
}

/// Limits for every call class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub historical: BucketConfig,
    pub order_placement: BucketConfig,
    pub quote: BucketConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            historical: BucketConfig::new(3.0, 3),
            order_placement: BucketConfig::new(10.0, 10),
            quote: BucketConfig::new(10.0, 10),
        }
    }
}

impl RateLimitConfig {
    /// Defaults overlaid with `RATE_LIMIT_<CLASS>_RATE` / `_BURST` variables.
    ///
    /// Unparsable values keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        for class in CallClass::ALL {
            let mut bucket = config.get(class);
            let prefix = class.env_prefix();
            if let Ok(v) = std::env::var(format!("{}_RATE", prefix)) {
                bucket.rate = v.parse().unwrap_or(bucket.rate);
            }
            if let Ok(v) = std::env::var(format!("{}_BURST", prefix)) {
                bucket.capacity = v.parse().unwrap_or(bucket.capacity);
            }
            config.set(class, bucket);
        }

        config
    }

    pub fn get(&self, class: CallClass) -> BucketConfig {
        match class {
            CallClass::Historical => self.historical,
            CallClass::OrderPlacement => self.order_placement,
            CallClass::Quote => self.quote,
        }
    }

    pub fn set(&mut self, class: CallClass, bucket: BucketConfig) {
        match class {
            CallClass::Historical => self.historical = bucket,
            CallClass::OrderPlacement => self.order_placement = bucket,
            CallClass::Quote => self.quote = bucket,
        }
    }
}

/// One independent bucket per call class.
#[derive(Debug, Clone)]
pub struct BrokerLimits {
    historical: Arc<TokenBucket>,
    order_placement: Arc<TokenBucket>,
    quote: Arc<TokenBucket>,
}

impl BrokerLimits {
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        let build = |class: CallClass| -> Result<Arc<TokenBucket>, RateLimitError> {
            let cfg = config.get(class);
            let bucket = TokenBucket::new(cfg.rate, cfg.capacity).map_err(|e| {
                RateLimitError::InvalidLimit {
                    class: class.to_string(),
                    reason: e.to_string(),
                }
            })?;
            info!(
                class = class.as_str(),
                rate = cfg.rate,
                capacity = cfg.capacity,
                "Rate limiter configured"
            );
            Ok(Arc::new(bucket))
        };

        Ok(Self {
            historical: build(CallClass::Historical)?,
            order_placement: build(CallClass::OrderPlacement)?,
            quote: build(CallClass::Quote)?,
        })
    }

    /// The bucket guarding `class`. Clone it into the client for that class.
    pub fn limiter(&self, class: CallClass) -> Arc<TokenBucket> {
        match class {
            CallClass::Historical => Arc::clone(&self.historical),
            CallClass::OrderPlacement => Arc::clone(&self.order_placement),
            CallClass::Quote => Arc::clone(&self.quote),
        }
    }
}
