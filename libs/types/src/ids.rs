//! Identifier types for instruments
//!
//! Instruments carry two identities: the canonical `InstrumentId` used
//! inside the core and the broker `Token` used on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::exchange::Exchange;

/// Canonical instrument identifier
///
/// Format: "SYMBOL.EXCHANGE" (e.g., "SBIN-EQ.NSE", "NIFTY26FEB2622500CE.NFO")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Build the identifier for a symbol listed on an exchange
    pub fn new(symbol: &str, exchange: &Exchange) -> Self {
        Self(format!("{}.{}", symbol, exchange))
    }

    /// Parse an existing "SYMBOL.EXCHANGE" string, returning None if malformed
    pub fn parse(s: impl Into<String>) -> Option<Self> {
        let s = s.into();
        match s.rsplit_once('.') {
            Some((symbol, venue)) if !symbol.is_empty() && !venue.is_empty() => Some(Self(s)),
            _ => None,
        }
    }

    /// Get the identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into symbol and exchange parts
    pub fn split(&self) -> (&str, &str) {
        self.0.rsplit_once('.').unwrap_or((self.0.as_str(), ""))
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Broker-assigned instrument token
///
/// Tokens are only unique within an exchange segment: the same number can
/// name an equity on NSE and a future on NFO.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
