//! Instrument reference records
//!
//! One `Instrument` per scrip-master row. Records are immutable once built;
//! a catalog refresh produces new records instead of editing old ones.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::exchange::{Exchange, InstrumentType};
use crate::ids::{InstrumentId, Token};

/// A tradable instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_id: InstrumentId,
    /// Broker trading symbol (e.g. "SBIN-EQ", "NIFTY26FEB2622500CE")
    pub symbol: String,
    /// Underlying / display name (e.g. "SBIN", "NIFTY")
    pub name: String,
    pub token: Token,
    pub exchange: Exchange,
    pub instrument_type: InstrumentType,
    pub expiry: Option<NaiveDate>,
    pub strike: Option<Decimal>,
    pub lot_size: u32,
    /// Minimum price increment in rupees
    pub price_increment: Decimal,
}

impl Instrument {
    pub fn is_derivative(&self) -> bool {
        self.instrument_type.is_derivative()
    }

    /// Round a price to the nearest valid increment.
    pub fn round_to_increment(&self, price: Decimal) -> Decimal {
        if self.price_increment.is_zero() {
            return price;
        }
        (price / self.price_increment).round() * self.price_increment
    }
}

/// Resolution of broker identities to instruments.
///
/// Implemented by the instrument catalog; consumed by the ingestion bridge to
/// fill in ticks that arrive with a token but no symbol. `exchange` narrows
/// the lookup when the caller knows the segment.
pub trait InstrumentLookup: Send + Sync {
    fn by_token(&self, token: &str, exchange: Option<&Exchange>) -> Option<Arc<Instrument>>;

    fn by_symbol(&self, symbol: &str, exchange: Option<&Exchange>) -> Option<Arc<Instrument>>;
}
