//! Scrip master row parsing
//!
//! Rows come straight from the broker's reference file, so values may be
//! strings or numbers and optional columns may be blank, `null` or absent.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use types::exchange::{Exchange, InstrumentType};
use types::ids::{InstrumentId, Token};
use types::instrument::Instrument;

use crate::error::RowError;

const TOKEN_KEYS: &[&str] = &["token"];
const SYMBOL_KEYS: &[&str] = &["symbol"];
const NAME_KEYS: &[&str] = &["name"];
const EXPIRY_KEYS: &[&str] = &["expiry"];
const STRIKE_KEYS: &[&str] = &["strike"];
const LOT_SIZE_KEYS: &[&str] = &["lotsize", "lot_size"];
const TYPE_KEYS: &[&str] = &["instrumenttype", "instrument_type"];
const EXCHANGE_KEYS: &[&str] = &["exch_seg", "exchange"];
const TICK_SIZE_KEYS: &[&str] = &["tick_size", "price_increment"];

/// Scrip master expiry format, e.g. "26FEB2026".
const EXPIRY_FORMAT: &str = "%d%b%Y";
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Build an instrument from one reference row.
pub fn parse_row(row: &Map<String, Value>) -> Result<Instrument, RowError> {
    let token = field(row, TOKEN_KEYS).ok_or(RowError::MissingField("token"))?;
    let symbol = field(row, SYMBOL_KEYS).ok_or(RowError::MissingField("symbol"))?;
    let exchange = field(row, EXCHANGE_KEYS)
        .map(|code| Exchange::parse(&code))
        .ok_or(RowError::MissingField("exch_seg"))?;

    let name = field(row, NAME_KEYS).unwrap_or_else(|| symbol.clone());
    let instrument_type = InstrumentType::parse(&field(row, TYPE_KEYS).unwrap_or_default());

    Ok(Instrument {
        instrument_id: InstrumentId::new(&symbol, &exchange),
        lot_size: parse_lot_size(field(row, LOT_SIZE_KEYS))?,
        expiry: parse_expiry(field(row, EXPIRY_KEYS))?,
        strike: parse_strike(field(row, STRIKE_KEYS))?,
        price_increment: parse_tick_size(field(row, TICK_SIZE_KEYS))?,
        token: Token::new(token),
        symbol,
        name,
        exchange,
        instrument_type,
    })
}

/// First non-blank value among `keys`, as trimmed text.
fn field(row: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|k| row.get(*k)).find_map(|value| {
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    })
}

fn parse_lot_size(raw: Option<String>) -> Result<u32, RowError> {
    let Some(text) = raw else {
        return Ok(1);
    };
    let lot = text
        .parse::<u32>()
        .ok()
        .or_else(|| {
            // Some exports write "75.0"
            Decimal::from_str(&text)
                .ok()
                .filter(|d| d.fract().is_zero())
                .and_then(|d| d.to_u32())
        })
        .filter(|lot| *lot > 0);
    lot.ok_or(RowError::InvalidLotSize(text))
}

fn parse_expiry(raw: Option<String>) -> Result<Option<NaiveDate>, RowError> {
    let Some(text) = raw else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&text, EXPIRY_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(&text, ISO_DATE_FORMAT))
        .map(Some)
        .map_err(|_| RowError::InvalidExpiry(text))
}

fn parse_strike(raw: Option<String>) -> Result<Option<Decimal>, RowError> {
    let Some(text) = raw else {
        return Ok(None);
    };
    let strike = Decimal::from_str(&text).map_err(|_| RowError::InvalidStrike(text))?;
    // Non-option rows carry "-1" or "0"
    Ok((strike > Decimal::ZERO).then_some(strike))
}

/// Minimum price increment in rupees.
///
/// The scrip master quotes tick size in paise ("5.000000" is five paise);
/// values below one are taken as already in rupees.
fn parse_tick_size(raw: Option<String>) -> Result<Decimal, RowError> {
    let default = Decimal::new(5, 2);
    let Some(text) = raw else {
        return Ok(default);
    };
    let tick = Decimal::from_str(&text).map_err(|_| RowError::InvalidTickSize(text))?;
    if tick <= Decimal::ZERO {
        Ok(default)
    } else if tick >= Decimal::ONE {
        Ok((tick / Decimal::ONE_HUNDRED).normalize())
    } else {
        Ok(tick.normalize())
    }
}
