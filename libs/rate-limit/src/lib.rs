//! Broker API rate limiting
//!
//! Each outbound call class (historical candles, order placement, quotes)
//! carries its own contractual ceiling, so each gets an independent token
//! bucket. Buckets never share state.
//!
//! ```text
//!  historical fetch ──► TokenBucket(3/s, burst 3)
//!  place/modify     ──► TokenBucket(10/s, burst 10)
//!  quote / ltp      ──► TokenBucket(10/s, burst 10)
//! ```
//!
//! Limiters are constructed by the composition root and handed to each call
//! site; there is no process-wide instance.

pub mod bucket;
pub mod error;
pub mod limits;

pub use bucket::TokenBucket;
pub use error::RateLimitError;
pub use limits::{BrokerLimits, BucketConfig, CallClass, RateLimitConfig};
