mod config;
mod input;
mod sinks;
mod state;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::parse();
    info!(?config, "Starting feed node");

    let state = AppState::new(&config)?;

    match state.load_catalog().await {
        Ok(true) => {}
        Ok(false) => warn!("No catalog path configured; token-only ticks will be rejected"),
        Err(e) => error!(error = ?e, "Initial catalog load failed; continuing unloaded"),
    }

    state.bridge.start().context("failed to start tick bridge")?;

    let (eof_tx, eof_rx) = oneshot::channel();
    input::spawn_stdin_reader(state.bridge.submitter(), eof_tx)
        .context("failed to spawn input thread")?;

    let stats_task = {
        let state = state.clone();
        let period = config.stats_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                state.log_stats();
            }
        })
    };

    let refresh_task = {
        let state = state.clone();
        let period = config.refresh_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = state.load_catalog().await {
                    warn!(error = ?e, "Catalog refresh failed; serving previous snapshot");
                }
            }
        })
    };

    // Stand-in UI listener; visible with RUST_LOG=feed_node=trace
    let ui_task = {
        let mut rx = state.ui.listen();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(tick) => {
                        trace!(symbol = %tick.symbol, ltp = tick.ltp, seq = tick.seq, "UI tick")
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(skipped = n, "UI listener lagged")
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupt received, shutting down"),
        _ = eof_rx => info!("Input exhausted, shutting down"),
    }

    stats_task.abort();
    refresh_task.abort();
    ui_task.abort();
    state.bridge.stop().await;
    state.log_stats();

    Ok(())
}
