//! Instrument catalog with atomic refresh
//!
//! The served snapshot lives behind an `ArcSwap`. Lookups load it without
//! locking; a refresh builds a complete replacement off to the side and
//! publishes it with a single pointer swap. A failed or cancelled build never
//! touches what readers see.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use types::exchange::Exchange;
use types::instrument::{Instrument, InstrumentLookup};

use crate::error::CatalogError;
use crate::row::parse_row;
use crate::snapshot::{CatalogSnapshot, Insert, SnapshotBuilder};
use crate::source::CatalogSource;

/// Only the first few skipped rows are logged individually.
const SKIP_LOG_LIMIT: u64 = 10;

/// Catalog configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Exchange searched when a lookup does not name one.
    pub preferred_exchange: Exchange,
    /// Rows between cancellation checks while building.
    pub cancel_check_every: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            preferred_exchange: Exchange::Nse,
            cancel_check_every: 4096,
        }
    }
}

impl CatalogConfig {
    /// Defaults overlaid with `CATALOG_*` environment variables.
    ///
    /// Unparsable values keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("CATALOG_PREFERRED_EXCHANGE") {
            if !v.trim().is_empty() {
                config.preferred_exchange = Exchange::parse(&v);
            }
        }
        if let Ok(v) = std::env::var("CATALOG_CANCEL_CHECK_EVERY") {
            config.cancel_check_every = v.parse().unwrap_or(config.cancel_check_every);
        }
        config
    }
}

/// Lifecycle of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogState {
    Unloaded,
    Loading,
    Ready,
    /// A new snapshot is being built; the previous one is still served.
    Refreshing,
}

/// Outcome of a successful load or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Instruments now resolvable.
    pub loaded: usize,
    /// Rows that could not be parsed.
    pub skipped: usize,
    /// Rows repeating an exchange+symbol or exchange+token already loaded.
    pub duplicates: usize,
    pub elapsed: Duration,
    pub generation: u64,
}

/// Cooperative cancellation for a refresh in progress.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Multi-indexed instrument catalog.
pub struct InstrumentCatalog {
    config: CatalogConfig,
    current: ArcSwap<CatalogSnapshot>,
    state: Mutex<CatalogState>,
    /// Held for the duration of a build; one build at a time.
    build_lock: Mutex<()>,
    generation: AtomicU64,
}

impl InstrumentCatalog {
    /// An unloaded catalog. Every lookup misses until `load` succeeds.
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            config,
            current: ArcSwap::from_pointee(CatalogSnapshot::empty()),
            state: Mutex::new(CatalogState::Unloaded),
            build_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Initial load. On a catalog that is already serving, behaves as `refresh`.
    pub fn load(&self, source: &CatalogSource) -> Result<LoadReport, CatalogError> {
        self.rebuild(source, None)
    }

    /// Build a new snapshot from `source` and swap it in.
    pub fn refresh(&self, source: &CatalogSource) -> Result<LoadReport, CatalogError> {
        self.rebuild(source, None)
    }

    /// `refresh` that gives up with `Cancelled` if `cancel` fires before the
    /// swap.
    pub fn refresh_cancellable(
        &self,
        source: &CatalogSource,
        cancel: &CancelToken,
    ) -> Result<LoadReport, CatalogError> {
        self.rebuild(source, Some(cancel))
    }

    fn rebuild(
        &self,
        source: &CatalogSource,
        cancel: Option<&CancelToken>,
    ) -> Result<LoadReport, CatalogError> {
        let _build = match self.build_lock.try_lock() {
            Ok(guard) => guard,
            Err(std::sync::TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(std::sync::TryLockError::WouldBlock) => {
                return Err(CatalogError::RefreshInProgress)
            }
        };

        let previous = self.state();
        let building = match previous {
            CatalogState::Unloaded | CatalogState::Loading => CatalogState::Loading,
            CatalogState::Ready | CatalogState::Refreshing => CatalogState::Refreshing,
        };
        self.set_state(building);
        info!(source = %source.describe(), state = ?building, "Building instrument catalog");

        match self.build(source, cancel) {
            Ok((snapshot, report)) => {
                self.current.store(Arc::new(snapshot));
                self.set_state(CatalogState::Ready);
                info!(
                    loaded = report.loaded,
                    skipped = report.skipped,
                    duplicates = report.duplicates,
                    generation = report.generation,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Instrument catalog ready"
                );
                Ok(report)
            }
            Err(err) => {
                let restored = match previous {
                    CatalogState::Ready | CatalogState::Refreshing => CatalogState::Ready,
                    CatalogState::Unloaded | CatalogState::Loading => CatalogState::Unloaded,
                };
                self.set_state(restored);
                warn!(
                    error = %err,
                    serving = self.current.load().len(),
                    "Catalog build failed, keeping previous snapshot"
                );
                Err(err)
            }
        }
    }

    fn build(
        &self,
        source: &CatalogSource,
        cancel: Option<&CancelToken>,
    ) -> Result<(CatalogSnapshot, LoadReport), CatalogError> {
        let started = Instant::now();
        let check_cancel = || match cancel {
            Some(token) if token.is_cancelled() => Err(CatalogError::Cancelled),
            _ => Ok(()),
        };

        let rows = source.read_rows()?;
        check_cancel()?;

        let generation = self.generation.load(Ordering::Relaxed) + 1;
        let mut builder = SnapshotBuilder::with_capacity(generation, rows.len());
        let mut skipped = 0usize;
        let mut duplicates = 0usize;
        let check_every = self.config.cancel_check_every.max(1);

        for (idx, row) in rows.into_iter().enumerate() {
            if idx % check_every == 0 {
                check_cancel()?;
            }

            match row.and_then(|r| parse_row(&r)) {
                Ok(instrument) => {
                    if builder.insert(instrument) == Insert::Duplicate {
                        duplicates += 1;
                    }
                }
                Err(err) => {
                    skipped += 1;
                    if skipped as u64 <= SKIP_LOG_LIMIT {
                        debug!(row = idx, error = %err, "Skipping reference row");
                    }
                }
            }
        }

        // Last chance to back out; after the swap the new snapshot is live
        check_cancel()?;
        self.generation.store(generation, Ordering::Relaxed);

        if skipped > 0 {
            warn!(skipped, "Reference rows skipped during catalog build");
        }

        let report = LoadReport {
            loaded: builder.len(),
            skipped,
            duplicates,
            elapsed: started.elapsed(),
            generation,
        };
        Ok((builder.finish(), report))
    }

    pub fn state(&self) -> CatalogState {
        *self.lock_state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == CatalogState::Ready
    }

    /// The snapshot currently served. Holding it pins one consistent view.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    pub fn preferred_exchange(&self) -> &Exchange {
        &self.config.preferred_exchange
    }

    /// Instrument listed as `symbol` on `exchange`, or on the preferred
    /// exchange when none is given.
    pub fn resolve_by_symbol(
        &self,
        symbol: &str,
        exchange: Option<&Exchange>,
    ) -> Option<Arc<Instrument>> {
        let exchange = exchange.unwrap_or(&self.config.preferred_exchange);
        self.current.load().resolve_by_symbol(symbol, exchange)
    }

    /// Instrument carrying broker `token` on `exchange`, or on the preferred
    /// exchange when none is given.
    pub fn resolve_by_token(
        &self,
        token: &str,
        exchange: Option<&Exchange>,
    ) -> Option<Arc<Instrument>> {
        let exchange = exchange.unwrap_or(&self.config.preferred_exchange);
        self.current.load().resolve_by_token(token, exchange)
    }

    pub fn by_expiry(&self, date: NaiveDate) -> Vec<Arc<Instrument>> {
        self.current.load().by_expiry(date)
    }

    pub fn expiries(&self) -> Vec<NaiveDate> {
        self.current.load().expiries()
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<Arc<Instrument>> {
        self.current.load().search(query, limit)
    }

    fn set_state(&self, state: CatalogState) {
        *self.lock_state() = state;
    }

    fn lock_state(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InstrumentCatalog {
    fn default() -> Self {
        Self::new(CatalogConfig::default())
    }
}

impl InstrumentLookup for InstrumentCatalog {
    fn by_token(&self, token: &str, exchange: Option<&Exchange>) -> Option<Arc<Instrument>> {
        self.resolve_by_token(token, exchange)
    }

    fn by_symbol(&self, symbol: &str, exchange: Option<&Exchange>) -> Option<Arc<Instrument>> {
        self.resolve_by_symbol(symbol, exchange)
    }
}
