//! Catalog errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

// ── Load errors ──

/// Failure of a whole load or refresh. The served snapshot is untouched.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("catalog source is not a JSON array of rows: {0}")]
    Format(#[from] serde_json::Error),

    #[error("catalog source has no readable CSV header: {0}")]
    CsvHeader(#[from] csv::Error),

    #[error("no catalog file found in {0}")]
    NoSource(PathBuf),

    #[error("a load or refresh is already in progress")]
    RefreshInProgress,

    #[error("refresh cancelled before swap")]
    Cancelled,
}

// ── Row errors ──

/// Why a single reference row was skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("row is not a JSON object")]
    NotAnObject,

    #[error("line {line} could not be parsed")]
    Unparsable { line: usize },

    #[error("missing required column {0}")]
    MissingField(&'static str),

    #[error("invalid lot size {0:?}")]
    InvalidLotSize(String),

    #[error("invalid expiry {0:?}")]
    InvalidExpiry(String),

    #[error("invalid strike {0:?}")]
    InvalidStrike(String),

    #[error("invalid tick size {0:?}")]
    InvalidTickSize(String),
}
