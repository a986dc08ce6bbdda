//! Rate limiter errors

use thiserror::Error;

/// Invalid limiter construction parameters.
///
/// Contention never produces an error: `acquire` returns false and
/// `acquire_async` waits.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateLimitError {
    #[error("rate must be a positive, finite number of tokens per second, got {0}")]
    InvalidRate(f64),

    #[error("capacity must be at least 1 token, got {0}")]
    InvalidCapacity(u32),

    #[error("invalid limit for {class}: {reason}")]
    InvalidLimit { class: String, reason: String },
}
