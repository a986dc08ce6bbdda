//! Market data ingestion for the feed core
//!
//! ```text
//!  network thread            dispatch loop (tokio task)
//!  ──────────────            ───────────────────────────
//!  TickSubmitter::submit ─► bounded queue ─► normalize ─┬─► subscriber A
//!    (never blocks;                       (+ catalog   ├─► subscriber B
//!     full queue = drop)                   lookup)     └─► subscriber C
//! ```
//!
//! Modules:
//! - `normalizer`: pure raw → canonical tick mapping, shared with replay paths
//! - `bridge`: bounded queue, dispatch loop and lifecycle
//! - `subscriber`: consumer trait and closure adapter
//! - `backpressure`: queue pressure bands
//! - `metrics`: counters and dispatch latency
//! - `config`: bridge configuration

pub mod backpressure;
pub mod bridge;
pub mod config;
pub mod metrics;
pub mod normalizer;
pub mod subscriber;

pub use backpressure::PressureBand;
pub use bridge::{BridgeError, SubmitOutcome, TickBridge, TickSubmitter};
pub use config::BridgeConfig;
pub use metrics::BridgeStats;
pub use normalizer::{normalize, normalize_with_lookup};
pub use subscriber::{FnSubscriber, TickSubscriber};
