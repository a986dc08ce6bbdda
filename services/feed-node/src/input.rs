//! Network-side producer
//!
//! Stands in for the broker socket: a plain OS thread reads one JSON tick per
//! line and submits it without touching the async runtime.

use std::io::BufRead;
use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use market_data::{SubmitOutcome, TickSubmitter};
use types::tick::RawTick;

/// Totals for one reader run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderSummary {
    pub lines: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub unparsable: u64,
}

/// Submit every line of `reader` until EOF.
pub fn pump<R: BufRead>(reader: R, submitter: &TickSubmitter) -> ReaderSummary {
    let mut summary = ReaderSummary::default();
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Input read failed, stopping reader");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;

        match RawTick::from_json(&line) {
            Ok(raw) => match submitter.submit(raw) {
                SubmitOutcome::Accepted => summary.accepted += 1,
                SubmitOutcome::Dropped => summary.dropped += 1,
            },
            Err(e) => {
                summary.unparsable += 1;
                debug!(line = summary.lines, error = %e, "Skipping unparsable input line");
            }
        }
    }
    summary
}

/// Read stdin on a dedicated thread. `done` fires at EOF.
pub fn spawn_stdin_reader(
    submitter: TickSubmitter,
    done: oneshot::Sender<ReaderSummary>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("feed-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            let summary = pump(stdin.lock(), &submitter);
            info!(
                lines = summary.lines,
                accepted = summary.accepted,
                dropped = summary.dropped,
                unparsable = summary.unparsable,
                "Input closed"
            );
            let _ = done.send(summary);
        })
}
