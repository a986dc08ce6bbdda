use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use instrument_catalog::{CatalogSource, InstrumentCatalog};
use market_data::TickBridge;
use rate_limit::{BrokerLimits, CallClass};

use crate::config::Config;
use crate::sinks::{MetricsSink, UiBroadcast};

/// Everything the node wires together. Built once in `main` and shared by
/// the background tasks.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<InstrumentCatalog>,
    pub bridge: Arc<TickBridge>,
    pub limits: BrokerLimits,
    pub ui: Arc<UiBroadcast>,
    pub metrics: Arc<MetricsSink>,
    pub catalog_path: Option<PathBuf>,
}

impl AppState {
    /// Build the components. The catalog is left unloaded; see
    /// [`AppState::load_catalog`].
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let catalog = Arc::new(InstrumentCatalog::new(config.catalog()));
        let limits = BrokerLimits::from_config(&config.rate_limits())
            .context("invalid rate limit configuration")?;

        let bridge = TickBridge::with_lookup(config.bridge(), catalog.clone())
            .context("invalid bridge configuration")?;

        let ui = Arc::new(UiBroadcast::new(config.ui_buffer));
        let metrics = Arc::new(MetricsSink::new());
        bridge.subscribe(ui.clone());
        bridge.subscribe(metrics.clone());

        Ok(Self {
            catalog,
            bridge: Arc::new(bridge),
            limits,
            ui,
            metrics,
            catalog_path: config.catalog_path.clone(),
        })
    }

    /// Load or refresh the catalog on the blocking pool.
    ///
    /// Returns `Ok(false)` when no catalog path is configured.
    pub async fn load_catalog(&self) -> anyhow::Result<bool> {
        let Some(path) = self.catalog_path.clone() else {
            return Ok(false);
        };
        let catalog = Arc::clone(&self.catalog);

        let report = tokio::task::spawn_blocking(move || {
            let source = resolve_source(&path)?;
            let report = if catalog.is_ready() {
                catalog.refresh(&source)?
            } else {
                catalog.load(&source)?
            };
            anyhow::Ok(report)
        })
        .await
        .context("catalog load task failed")??;

        info!(
            loaded = report.loaded,
            skipped = report.skipped,
            duplicates = report.duplicates,
            generation = report.generation,
            "Catalog ready"
        );
        Ok(true)
    }

    pub fn log_stats(&self) {
        let stats = self.bridge.stats();
        let top = self.metrics.top(5);
        let quote_tokens = self.limits.limiter(CallClass::Quote).available();
        match serde_json::to_string(&stats) {
            Ok(json) => info!(
                stats = %json,
                top = ?top,
                catalog = self.catalog.len(),
                quote_tokens,
                "Feed stats"
            ),
            Err(e) => warn!(error = %e, "Could not serialize feed stats"),
        }
    }
}

fn resolve_source(path: &Path) -> anyhow::Result<CatalogSource> {
    if path.is_dir() {
        CatalogSource::latest_in(path).context("no catalog file in directory")
    } else {
        Ok(CatalogSource::file(path))
    }
}
