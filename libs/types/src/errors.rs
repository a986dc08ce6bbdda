//! Error types shared across the feed core
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

/// Reason a raw tick could not be normalized.
///
/// Rejections are counted and dropped by the bridge, never raised to the
/// producer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TickRejection {
    #[error("tick carries no symbol or token")]
    MissingSymbol,

    #[error("tick carries token {token} but no symbol")]
    UnresolvedToken { token: String },
}

impl TickRejection {
    /// Stable reason code for metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            TickRejection::MissingSymbol => "missing_symbol",
            TickRejection::UnresolvedToken { .. } => "unresolved_token",
        }
    }
}
