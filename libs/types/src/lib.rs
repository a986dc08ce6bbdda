//! Types library for the market feed core
//!
//! Shared definitions used by the ingestion bridge, the instrument catalog
//! and the broker rate limiter, so every crate agrees on one tick shape and
//! one instrument record.
//!
//! # Modules
//! - `ids`: Identifiers (InstrumentId, Token)
//! - `exchange`: Exchange segments and instrument classes
//! - `tick`: Raw feed payloads and the canonical tick schema
//! - `instrument`: Instrument records and the lookup seam
//! - `errors`: Error taxonomy

pub mod ids;
pub mod exchange;
pub mod tick;
pub mod instrument;
pub mod errors;
