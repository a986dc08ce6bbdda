//! Immutable catalog snapshot
//!
//! All indices are built together by `SnapshotBuilder` and never change
//! afterwards. A refresh builds a whole new snapshot; readers holding the old
//! one keep a consistent view until they drop it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;

use types::exchange::Exchange;
use types::instrument::Instrument;

/// Position in `CatalogSnapshot::instruments`.
type Slot = usize;

/// One fully built, internally consistent set of indices.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    instruments: Vec<Arc<Instrument>>,
    /// Symbols and tokens are only unique within one exchange segment.
    by_symbol: HashMap<Exchange, HashMap<String, Slot>>,
    by_token: HashMap<Exchange, HashMap<String, Slot>>,
    by_expiry: BTreeMap<NaiveDate, Vec<Slot>>,
    /// Upper-cased symbols, sorted, for prefix search.
    search_keys: Vec<(String, Slot)>,
    generation: u64,
}

impl CatalogSnapshot {
    /// The placeholder served before the first load.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of instruments.
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Load counter; 0 for the empty placeholder.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn instruments(&self) -> &[Arc<Instrument>] {
        &self.instruments
    }

    pub fn resolve_by_symbol(&self, symbol: &str, exchange: &Exchange) -> Option<Arc<Instrument>> {
        self.by_symbol
            .get(exchange)?
            .get(symbol)
            .map(|slot| self.at(*slot))
    }

    pub fn resolve_by_token(&self, token: &str, exchange: &Exchange) -> Option<Arc<Instrument>> {
        self.by_token
            .get(exchange)?
            .get(token)
            .map(|slot| self.at(*slot))
    }

    /// Derivatives expiring on `date`, sorted by symbol.
    pub fn by_expiry(&self, date: NaiveDate) -> Vec<Arc<Instrument>> {
        self.by_expiry
            .get(&date)
            .map(|slots| slots.iter().map(|slot| self.at(*slot)).collect())
            .unwrap_or_default()
    }

    /// Every expiry date present, ascending.
    pub fn expiries(&self) -> Vec<NaiveDate> {
        self.by_expiry.keys().copied().collect()
    }

    /// Case-insensitive symbol search.
    ///
    /// Prefix matches come first in symbol order, then symbols that merely
    /// contain `query`, until `limit` results.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Arc<Instrument>> {
        let needle = query.trim().to_ascii_uppercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let start = self
            .search_keys
            .partition_point(|(key, _)| key.as_str() < needle.as_str());
        let mut results: Vec<Arc<Instrument>> = self.search_keys[start..]
            .iter()
            .take_while(|(key, _)| key.starts_with(&needle))
            .take(limit)
            .map(|(_, slot)| self.at(*slot))
            .collect();

        if results.len() < limit {
            let remaining = limit - results.len();
            results.extend(
                self.search_keys
                    .iter()
                    .filter(|(key, _)| !key.starts_with(&needle) && key.contains(&needle))
                    .take(remaining)
                    .map(|(_, slot)| self.at(*slot)),
            );
        }

        results
    }

    fn at(&self, slot: Slot) -> Arc<Instrument> {
        Arc::clone(&self.instruments[slot])
    }
}

/// Outcome of offering a row to the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    Added,
    /// Same exchange and symbol, or same exchange and token, already seen.
    Duplicate,
}

/// Accumulates instruments and indexes them as they arrive.
pub struct SnapshotBuilder {
    snapshot: CatalogSnapshot,
}

impl SnapshotBuilder {
    pub fn new(generation: u64) -> Self {
        Self {
            snapshot: CatalogSnapshot {
                generation,
                ..CatalogSnapshot::default()
            },
        }
    }

    pub fn with_capacity(generation: u64, rows: usize) -> Self {
        let mut builder = Self::new(generation);
        builder.snapshot.instruments.reserve(rows);
        builder.snapshot.search_keys.reserve(rows);
        builder
    }

    /// Index one instrument. The first row for a key wins.
    pub fn insert(&mut self, instrument: Instrument) -> Insert {
        let snap = &mut self.snapshot;
        let symbols = snap.by_symbol.entry(instrument.exchange.clone()).or_default();
        let tokens = snap.by_token.entry(instrument.exchange.clone()).or_default();
        if symbols.contains_key(&instrument.symbol)
            || tokens.contains_key(instrument.token.as_str())
        {
            return Insert::Duplicate;
        }

        let slot = snap.instruments.len();
        symbols.insert(instrument.symbol.clone(), slot);
        tokens.insert(instrument.token.as_str().to_string(), slot);

        if instrument.is_derivative() {
            if let Some(expiry) = instrument.expiry {
                snap.by_expiry.entry(expiry).or_default().push(slot);
            }
        }
        snap.search_keys.push((instrument.symbol.to_ascii_uppercase(), slot));
        snap.instruments.push(Arc::new(instrument));

        Insert::Added
    }

    pub fn len(&self) -> usize {
        self.snapshot.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.instruments.is_empty()
    }

    /// Sort the ordered indices and hand over the finished snapshot.
    pub fn finish(mut self) -> CatalogSnapshot {
        let snap = &mut self.snapshot;
        let instruments = &snap.instruments;
        for slots in snap.by_expiry.values_mut() {
            slots.sort_by(|a, b| instruments[*a].symbol.cmp(&instruments[*b].symbol));
        }
        snap.search_keys.sort();
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use types::exchange::InstrumentType;
    use types::ids::{InstrumentId, Token};

    fn inst(
        symbol: &str,
        token: &str,
        exchange: Exchange,
        expiry: Option<NaiveDate>,
    ) -> Instrument {
        let instrument_type = if expiry.is_some() {
            InstrumentType::IndexOption
        } else {
            InstrumentType::Equity
        };
        Instrument {
            instrument_id: InstrumentId::new(symbol, &exchange),
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            token: Token::new(token),
            exchange,
            instrument_type,
            expiry,
            strike: None,
            lot_size: 1,
            price_increment: Decimal::new(5, 2),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_duplicates_first_wins() {
        let mut builder = SnapshotBuilder::new(1);
        let sbin = inst("SBIN-EQ", "3045", Exchange::Nse, None);
        assert_eq!(builder.insert(sbin), Insert::Added);
        let same_symbol = inst("SBIN-EQ", "9999", Exchange::Nse, None);
        assert_eq!(builder.insert(same_symbol), Insert::Duplicate);
        let same_token = inst("OTHER-EQ", "3045", Exchange::Nse, None);
        assert_eq!(builder.insert(same_token), Insert::Duplicate);
        // Same token on another segment is a different instrument
        let future = inst("NIFTYFUT", "3045", Exchange::Nfo, None);
        assert_eq!(builder.insert(future), Insert::Added);

        let snap = builder.finish();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.resolve_by_token("3045", &Exchange::Nse).unwrap().symbol, "SBIN-EQ");
        assert_eq!(snap.resolve_by_token("3045", &Exchange::Nfo).unwrap().symbol, "NIFTYFUT");
    }

    #[test]
    fn test_lookups_are_scoped_to_exchange() {
        let mut builder = SnapshotBuilder::new(1);
        builder.insert(inst("SBIN-EQ", "500112", Exchange::Bse, None));
        builder.insert(inst("SBIN-EQ", "3045", Exchange::Nse, None));
        builder.insert(inst("TATA-EQ", "1", Exchange::Bse, None));
        let snap = builder.finish();

        let nse = snap.resolve_by_symbol("SBIN-EQ", &Exchange::Nse).unwrap();
        assert_eq!(nse.token.as_str(), "3045");
        let bse = snap.resolve_by_symbol("SBIN-EQ", &Exchange::Bse).unwrap();
        assert_eq!(bse.token.as_str(), "500112");
        assert!(snap.resolve_by_symbol("TATA-EQ", &Exchange::Nse).is_none());
        assert!(snap.resolve_by_symbol("SBIN-EQ", &Exchange::Mcx).is_none());
    }

    #[test]
    fn test_by_expiry_sorted_by_symbol() {
        let feb = date(2026, 2, 26);
        let mut builder = SnapshotBuilder::new(1);
        builder.insert(inst("NIFTY26FEB2622600CE", "2", Exchange::Nfo, Some(feb)));
        builder.insert(inst("BANKNIFTY26FEB2648000PE", "3", Exchange::Nfo, Some(feb)));
        let mar = date(2026, 3, 26);
        builder.insert(inst("NIFTY26MAR2622500CE", "4", Exchange::Nfo, Some(mar)));
        let snap = builder.finish();

        let symbols: Vec<_> = snap.by_expiry(feb).iter().map(|i| i.symbol.clone()).collect();
        assert_eq!(symbols, vec!["BANKNIFTY26FEB2648000PE", "NIFTY26FEB2622600CE"]);
        assert_eq!(snap.expiries(), vec![feb, mar]);
        assert!(snap.by_expiry(date(2030, 1, 1)).is_empty());
    }

    #[test]
    fn test_search_prefix_then_substring() {
        let mut builder = SnapshotBuilder::new(1);
        let symbols = ["BANKNIFTY", "NIFTY", "NIFTYIT", "FINNIFTY", "SBIN-EQ"];
        for (i, symbol) in symbols.iter().enumerate() {
            builder.insert(inst(symbol, &i.to_string(), Exchange::Nse, None));
        }
        let snap = builder.finish();

        let found: Vec<_> = snap.search("nifty", 10).iter().map(|i| i.symbol.clone()).collect();
        assert_eq!(found, vec!["NIFTY", "NIFTYIT", "BANKNIFTY", "FINNIFTY"]);
        assert_eq!(snap.search("nifty", 1).len(), 1);
        assert!(snap.search("  ", 5).is_empty());
        assert!(snap.search("ZZZ", 5).is_empty());
    }

    #[test]
    fn test_empty_snapshot_resolves_nothing() {
        let snap = CatalogSnapshot::empty();
        assert!(snap.is_empty());
        assert_eq!(snap.generation(), 0);
        assert!(snap.resolve_by_symbol("SBIN-EQ", &Exchange::Nse).is_none());
        assert!(snap.resolve_by_token("3045", &Exchange::Nse).is_none());
    }
}
