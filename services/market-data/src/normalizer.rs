//! Raw tick normalization
//!
//! Maps the loosely-shaped payloads handed over by the feed onto
//! `CanonicalTick`. The broker has shipped several field-naming schemes over
//! time (streaming snapshots, REST quotes, our own canonical form), so each
//! logical field is read from an ordered list of aliases and the first
//! usable value wins.
//!
//! `normalize` is pure: no I/O, no shared state. The live bridge and any
//! offline replay go through the same function.

use chrono::DateTime;
use serde_json::Value;

use types::errors::TickRejection;
use types::exchange::Exchange;
use types::instrument::InstrumentLookup;
use types::tick::{CanonicalTick, RawTick};

const SYMBOL_KEYS: &[&str] = &["symbol", "trading_symbol", "tradingsymbol", "tradingSymbol"];
const TOKEN_KEYS: &[&str] = &["token", "symbol_token", "symbolToken"];
const EXCHANGE_KEYS: &[&str] = &["exchange", "exch_seg"];
const EXCHANGE_CODE_KEY: &str = "exchange_type";
const TIMESTAMP_NS_KEY: &str = "timestamp_ns";
const TIMESTAMP_KEYS: &[&str] = &["exchange_timestamp", "last_traded_timestamp", "timestamp"];
const LTP_KEYS: &[&str] = &["ltp", "last_traded_price", "last_price", "close"];
const BID_KEYS: &[&str] = &["best_bid_price", "bid"];
const ASK_KEYS: &[&str] = &["best_ask_price", "ask"];
const BID_QTY_KEYS: &[&str] = &["best_bid_qty", "bid_qty"];
const ASK_QTY_KEYS: &[&str] = &["best_ask_qty", "ask_qty"];
const VOLUME_KEYS: &[&str] = &["volume", "vol", "volume_trade_for_the_day"];
const SEQ_KEYS: &[&str] = &["seq"];
const BUY_DEPTH_KEY: &str = "best_5_buy_data";
const SELL_DEPTH_KEY: &str = "best_5_sell_data";
const DEPTH_PRICE_KEYS: &[&str] = &["price"];
const DEPTH_QTY_KEYS: &[&str] = &["quantity", "qty"];

/// Streaming-mode snapshots carry a non-null value here and quote prices in paise.
const STREAMING_MARKER_KEY: &str = "subscription_mode";
const PAISE_PER_RUPEE: f64 = 100.0;

/// Normalize one raw tick.
///
/// Only the identity is mandatory. A tick with a token but no symbol is
/// rejected as `UnresolvedToken` so a caller holding the instrument catalog
/// can resolve it and try again; see [`normalize_with_lookup`].
pub fn normalize(raw: &RawTick) -> Result<CanonicalTick, TickRejection> {
    let symbol = match first_text(raw, SYMBOL_KEYS) {
        Some(symbol) => symbol,
        None => {
            return Err(match first_text(raw, TOKEN_KEYS) {
                Some(token) => TickRejection::UnresolvedToken { token },
                None => TickRejection::MissingSymbol,
            })
        }
    };

    let price_scale = if raw.get(STREAMING_MARKER_KEY).is_some_and(|v| !v.is_null()) {
        PAISE_PER_RUPEE
    } else {
        1.0
    };
    let buy_top = depth_top(raw, BUY_DEPTH_KEY);
    let sell_top = depth_top(raw, SELL_DEPTH_KEY);

    let bid = first_price(raw, BID_KEYS)
        .or_else(|| buy_top.and_then(|level| price_in(level, DEPTH_PRICE_KEYS)))
        .unwrap_or(0.0);
    let ask = first_price(raw, ASK_KEYS)
        .or_else(|| sell_top.and_then(|level| price_in(level, DEPTH_PRICE_KEYS)))
        .unwrap_or(0.0);
    let bid_qty = first_qty(raw, BID_QTY_KEYS)
        .or_else(|| buy_top.and_then(|level| qty_in(level, DEPTH_QTY_KEYS)))
        .unwrap_or(0);
    let ask_qty = first_qty(raw, ASK_QTY_KEYS)
        .or_else(|| sell_top.and_then(|level| qty_in(level, DEPTH_QTY_KEYS)))
        .unwrap_or(0);

    Ok(CanonicalTick {
        symbol,
        exchange: exchange_hint(raw).unwrap_or_default(),
        timestamp: timestamp_ns(raw),
        ltp: first_price(raw, LTP_KEYS).unwrap_or(0.0) / price_scale,
        bid: bid / price_scale,
        ask: ask / price_scale,
        bid_qty,
        ask_qty,
        volume: first_qty(raw, VOLUME_KEYS).unwrap_or(0),
        seq: first_qty(raw, SEQ_KEYS).unwrap_or(0),
    })
}

/// Normalize, resolving token-only ticks through the instrument catalog.
///
/// A resolved tick gets the instrument's symbol (and its exchange, when the
/// tick did not carry one) and is normalized again. Lookup misses keep the
/// original rejection.
pub fn normalize_with_lookup(
    raw: &RawTick,
    lookup: &dyn InstrumentLookup,
) -> Result<CanonicalTick, TickRejection> {
    match normalize(raw) {
        Err(TickRejection::UnresolvedToken { token }) => {
            let hint = exchange_hint(raw);
            let Some(instrument) = lookup.by_token(&token, hint.as_ref()) else {
                return Err(TickRejection::UnresolvedToken { token });
            };

            let mut resolved = raw.clone();
            resolved.insert("symbol", instrument.symbol.clone());
            if hint.is_none() {
                resolved.insert("exchange", instrument.exchange.as_str());
            }
            normalize(&resolved)
        }
        other => other,
    }
}

/// Exchange named by the tick, if any.
pub fn exchange_hint(raw: &RawTick) -> Option<Exchange> {
    if let Some(code) = first_text(raw, EXCHANGE_KEYS) {
        return Some(Exchange::parse(&code));
    }
    raw.get(EXCHANGE_CODE_KEY)
        .and_then(as_u64)
        .and_then(Exchange::from_feed_code)
}

fn first_text(raw: &RawTick, keys: &[&str]) -> Option<String> {
    raw.first_of(keys, as_text)
}

fn first_price(raw: &RawTick, keys: &[&str]) -> Option<f64> {
    raw.first_of(keys, as_price)
}

fn first_qty(raw: &RawTick, keys: &[&str]) -> Option<u64> {
    raw.first_of(keys, as_u64)
}

fn price_in(level: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().filter_map(|k| level.get(*k)).find_map(as_price)
}

fn qty_in(level: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().filter_map(|k| level.get(*k)).find_map(as_u64)
}

/// Top level of a `best_5_*` depth array.
fn depth_top<'a>(raw: &'a RawTick, key: &str) -> Option<&'a Value> {
    raw.get(key)?.as_array()?.first().filter(|v| v.is_object())
}

fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn as_f64(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

/// Prices are never negative; a negative quote reads as "not available".
fn as_price(value: &Value) -> Option<f64> {
    as_f64(value).map(|v| if v > 0.0 { v } else { 0.0 })
}

/// Quantities truncate towards zero and clamp at zero.
fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|_| 0))
            .or_else(|| as_f64(value).map(f64_to_qty)),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .ok()
            .or_else(|| as_f64(value).map(f64_to_qty)),
        _ => None,
    }
}

fn f64_to_qty(v: f64) -> u64 {
    if v > 0.0 {
        // `as` saturates at u64::MAX
        v.trunc() as u64
    } else {
        0
    }
}

/// Exchange time in Unix nanoseconds, or 0 when absent or unreadable.
fn timestamp_ns(raw: &RawTick) -> i64 {
    if let Some(ns) = raw.get(TIMESTAMP_NS_KEY).and_then(as_i64_exact) {
        return ns.max(0);
    }

    raw.first_of(TIMESTAMP_KEYS, |value| match value {
        Value::Number(_) => scale_epoch(value),
        Value::String(s) => scale_epoch(value).or_else(|| parse_rfc3339(s)),
        _ => None,
    })
    .unwrap_or(0)
}

fn as_i64_exact(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Scale an epoch value to nanoseconds, guessing the unit by magnitude.
fn scale_epoch(value: &Value) -> Option<i64> {
    if let Some(int) = as_i64_exact(value) {
        if int <= 0 {
            return Some(0);
        }
        let factor = match int {
            i if i > 10_000_000_000_000_000 => 1,
            i if i > 10_000_000_000_000 => 1_000,
            i if i > 10_000_000_000 => 1_000_000,
            _ => 1_000_000_000,
        };
        return Some(int.saturating_mul(factor));
    }

    let v = as_f64(value)?;
    if v <= 0.0 {
        return Some(0);
    }
    let factor = if v > 1e16 {
        1.0
    } else if v > 1e13 {
        1e3
    } else if v > 1e10 {
        1e6
    } else {
        1e9
    };
    // `as` saturates on overflow
    Some((v * factor) as i64)
}

fn parse_rfc3339(s: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()?
        .timestamp_nanos_opt()
        .map(|ns| ns.max(0))
}
