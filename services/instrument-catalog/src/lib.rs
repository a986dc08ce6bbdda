//! Instrument catalog
//!
//! Loads the broker's scrip master (hundreds of thousands of rows) into an
//! immutable, multi-indexed snapshot and serves lookups by symbol, by token
//! and by expiry. Refreshes build a new snapshot and swap it in atomically.
//!
//! Modules:
//! - `source`: where rows come from (file or memory, JSON array or lines)
//! - `row`: one row to one `Instrument`
//! - `snapshot`: the immutable indices
//! - `catalog`: state machine, refresh and the lookup facade
//! - `error`: load and row errors

pub mod catalog;
pub mod error;
pub mod row;
pub mod snapshot;
pub mod source;

pub use catalog::{CancelToken, CatalogConfig, CatalogState, InstrumentCatalog, LoadReport};
pub use error::{CatalogError, RowError};
pub use snapshot::CatalogSnapshot;
pub use source::{CatalogSource, SourceFormat};
