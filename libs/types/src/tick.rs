//! Tick shapes: what the network thread hands over, and what subscribers get
//!
//! `RawTick` is deliberately loose. Field names and value types vary by
//! feed mode and broker API version, so it is a JSON object and nothing more.
//! `CanonicalTick` is the one stable shape every downstream consumer sees.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::exchange::Exchange;

/// Unstructured tick payload as received from the broker feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTick(Map<String, Value>);

impl RawTick {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a decoded JSON value. Only objects are ticks.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Parse a JSON object from text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Builder-style insert, handy for adapters and tests.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Value of the first alias in `keys` that `convert` accepts.
    ///
    /// Aliases that are missing, null or do not convert are skipped, so a
    /// garbled primary key falls through to the next alias.
    pub fn first_of<T>(&self, keys: &[&str], convert: impl Fn(&Value) -> Option<T>) -> Option<T> {
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .filter(|v| !v.is_null())
            .find_map(convert)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for RawTick {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Normalized tick delivered to every subscriber.
///
/// Every field is always populated; unavailable numeric values are zero.
/// `timestamp` is exchange time in Unix nanoseconds (0 when the feed did not
/// carry one). `seq` is the bridge's seen-order counter and is only meant for
/// latency correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTick {
    pub symbol: String,
    pub exchange: Exchange,
    pub timestamp: i64,
    pub ltp: f64,
    pub bid: f64,
    pub ask: f64,
    pub bid_qty: u64,
    pub ask_qty: u64,
    pub volume: u64,
    pub seq: u64,
}

impl CanonicalTick {
    /// Re-express this tick in the raw payload shape.
    ///
    /// Normalizing the result yields this tick again, field for field.
    pub fn to_raw(&self) -> RawTick {
        RawTick::new()
            .with("symbol", self.symbol.clone())
            .with("exchange", self.exchange.as_str())
            .with("timestamp_ns", self.timestamp)
            .with("ltp", self.ltp)
            .with("bid", self.bid)
            .with("ask", self.ask)
            .with("bid_qty", self.bid_qty)
            .with("ask_qty", self.ask_qty)
            .with("volume", self.volume)
            .with("seq", self.seq)
    }

    /// Mid price, or ltp when one side of the book is missing.
    pub fn mid(&self) -> f64 {
        if self.bid > 0.0 && self.ask > 0.0 {
            (self.bid + self.ask) / 2.0
        } else {
            self.ltp
        }
    }
}
