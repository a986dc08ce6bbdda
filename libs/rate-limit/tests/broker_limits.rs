//! Token bucket timing behavior
//!
//! Uses the real clock: the limiter measures wall time, and the assertions
//! carry scheduler tolerance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rate_limit::{BrokerLimits, BucketConfig, CallClass, RateLimitConfig, TokenBucket};

#[tokio::test]
async fn test_async_acquire_waits_one_refill_interval() {
    let bucket = TokenBucket::new(5.0, 5).unwrap();

    for _ in 0..5 {
        assert!(bucket.acquire(1));
    }
    assert!(!bucket.acquire(1));

    let start = Instant::now();
    bucket.acquire_async(1).await;
    let waited = start.elapsed();

    // 1 / rate = 200ms, minus the sliver refilled since the burst
    assert!(waited >= Duration::from_millis(190), "waited {:?}", waited);
    assert!(waited < Duration::from_millis(600), "waited {:?}", waited);
}

#[tokio::test]
async fn test_async_acquire_immediate_when_tokens_available() {
    let bucket = TokenBucket::new(1.0, 2).unwrap();

    let start = Instant::now();
    bucket.acquire_async(2).await;
    assert!(start.elapsed() < Duration::from_millis(50));
    assert!(!bucket.acquire(1));
}

#[tokio::test]
async fn test_caller_bounds_wait_with_timeout() {
    let bucket = TokenBucket::new(0.5, 1).unwrap();
    assert!(bucket.acquire(1));

    // Next token is 2s away; the caller gives up first
    let result = tokio::time::timeout(Duration::from_millis(50), bucket.acquire_async(1)).await;
    assert!(result.is_err());

    // The abandoned wait took nothing
    assert!(bucket.available() < 1.0);
}

#[tokio::test]
async fn test_oversized_request_is_clamped() {
    let bucket = TokenBucket::new(100.0, 3).unwrap();
    assert!(!bucket.acquire(5));

    // Waiting callers get the whole bucket instead of hanging
    tokio::time::timeout(Duration::from_secs(1), bucket.acquire_async(5))
        .await
        .expect("clamped request should complete");
    assert!(bucket.available() < 1.0);
}

#[tokio::test]
async fn test_concurrent_waiters_are_all_served() {
    let bucket = Arc::new(TokenBucket::new(50.0, 1).unwrap());
    assert!(bucket.acquire(1));

    let start = Instant::now();
    let handles: Vec<_> = (0..5)
        .map(|_| {
            let bucket = Arc::clone(&bucket);
            tokio::spawn(async move { bucket.acquire_async(1).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    // 5 tokens at 50/s need at least ~100ms
    assert!(start.elapsed() >= Duration::from_millis(90));
}

#[test]
fn test_classes_do_not_share_tokens() {
    let mut config = RateLimitConfig::default();
    config.set(CallClass::Historical, BucketConfig::new(1.0, 1));
    config.set(CallClass::Quote, BucketConfig::new(1.0, 2));
    let limits = BrokerLimits::from_config(&config).unwrap();

    let historical = limits.limiter(CallClass::Historical);
    assert!(historical.acquire(1));
    assert!(!historical.acquire(1));

    // Draining historical leaves the other classes untouched
    let quote = limits.limiter(CallClass::Quote);
    assert!(quote.acquire(1));
    assert!(quote.acquire(1));
    assert!(limits.limiter(CallClass::OrderPlacement).acquire(10));
}
