//! Token bucket
//!
//! Refill and decrement happen in one critical section, so no caller ever
//! acts on a stale token count. The lock is held for a handful of float
//! operations and never across an await or a sleep.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::error::RateLimitError;

/// Shortest sleep between re-checks; keeps a near-zero deficit from spinning.
const MIN_RECHECK: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant, rate: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = f64::min(capacity, self.tokens + elapsed * rate);
        self.last_refill = now;
    }
}

/// A refillable pool of permits.
#[derive(Debug)]
pub struct TokenBucket {
    /// Tokens added per second.
    rate: f64,
    /// Maximum burst.
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(rate: f64, capacity: u32) -> Result<Self, RateLimitError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(RateLimitError::InvalidRate(rate));
        }
        if capacity == 0 {
            return Err(RateLimitError::InvalidCapacity(capacity));
        }

        Ok(Self {
            rate,
            capacity: capacity as f64,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    /// Try to take `n` tokens without waiting.
    ///
    /// Returns false and leaves the bucket untouched when fewer than `n`
    /// tokens are available.
    pub fn acquire(&self, n: u32) -> bool {
        self.try_take(n as f64).is_ok()
    }

    /// Wait cooperatively until `n` tokens are granted.
    ///
    /// The task sleeps for the time the missing tokens need to refill (at
    /// most `n / rate`) and re-checks; it never spins. There is no timeout:
    /// wrap the future in `tokio::time::timeout` to bound the wait.
    pub async fn acquire_async(&self, n: u32) {
        let n = self.clamp_request(n);
        loop {
            match self.try_take(n) {
                Ok(()) => return,
                Err(wait) => {
                    trace!(wait_ms = wait.as_millis() as u64, "rate limited, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Blocking variant of `acquire_async` for synchronous callers.
    pub fn acquire_blocking(&self, n: u32) {
        let n = self.clamp_request(n);
        loop {
            match self.try_take(n) {
                Ok(()) => return,
                Err(wait) => std::thread::sleep(wait),
            }
        }
    }

    /// Tokens available right now (fractional).
    pub fn available(&self) -> f64 {
        let state = self.lock();
        let elapsed = Instant::now()
            .saturating_duration_since(state.last_refill)
            .as_secs_f64();
        f64::min(self.capacity, state.tokens + elapsed * self.rate)
    }

    /// Refill, then take `n` or report how long until `n` are available.
    fn try_take(&self, n: f64) -> Result<(), Duration> {
        let mut state = self.lock();
        state.refill(Instant::now(), self.rate, self.capacity);

        if state.tokens >= n {
            state.tokens -= n;
            Ok(())
        } else {
            let deficit = n - state.tokens;
            Err(Duration::from_secs_f64(deficit / self.rate).max(MIN_RECHECK))
        }
    }

    /// A request above capacity could never be granted; waiting callers get
    /// the whole bucket instead of waiting forever.
    fn clamp_request(&self, n: u32) -> f64 {
        let requested = n as f64;
        if requested > self.capacity {
            warn!(
                requested = n,
                capacity = self.capacity as u32,
                "Token request exceeds bucket capacity, clamping"
            );
            self.capacity
        } else {
            requested
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_tokens_stay_within_bounds(
            capacity in 1u32..50,
            requests in proptest::collection::vec(0u32..20, 1..40),
        ) {
            let bucket = TokenBucket::new(100.0, capacity).unwrap();
            for n in requests {
                let granted = bucket.acquire(n);
                let after = bucket.available();
                prop_assert!(after >= 0.0);
                prop_assert!(after <= capacity as f64);
                if n > capacity {
                    prop_assert!(!granted);
                }
            }
        }
    }
}
