//! Queue pressure bands
//!
//! The bridge never throttles its producer: a full queue drops the newest
//! tick and that is the only relief. Occupancy is still classified into
//! bands so operators can alert on a consumer that is falling behind.
//!
//! Bands are informational only. Crossing one changes nothing about how
//! ticks are accepted or dispatched.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Queue occupancy classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureBand {
    /// Below the warning threshold.
    Normal,
    /// Between the warning and critical thresholds.
    Warning,
    /// Above the critical threshold.
    Critical,
}

impl PressureBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            PressureBand::Normal => "normal",
            PressureBand::Warning => "warning",
            PressureBand::Critical => "critical",
        }
    }
}

/// Utilization thresholds in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandThresholds {
    pub warning_pct: f64,
    pub critical_pct: f64,
}

impl Default for BandThresholds {
    fn default() -> Self {
        Self {
            warning_pct: 80.0,
            critical_pct: 95.0,
        }
    }
}

impl BandThresholds {
    /// Classify `depth` out of `capacity`.
    ///
    /// The warning band is inclusive of its lower bound; critical starts
    /// strictly above its threshold.
    pub fn classify(&self, depth: usize, capacity: usize) -> PressureBand {
        let pct = utilization_pct(depth, capacity);
        if pct > self.critical_pct {
            PressureBand::Critical
        } else if pct >= self.warning_pct {
            PressureBand::Warning
        } else {
            PressureBand::Normal
        }
    }
}

/// Occupancy as a percentage of capacity. An empty-capacity queue reads 0.
pub fn utilization_pct(depth: usize, capacity: usize) -> f64 {
    if capacity == 0 {
        return 0.0;
    }
    depth as f64 / capacity as f64 * 100.0
}

/// Tracks the last observed band and logs transitions.
///
/// Owned by the dispatch loop; only transitions are logged so a queue that
/// sits in one band does not flood the log.
#[derive(Debug)]
pub struct BandMonitor {
    thresholds: BandThresholds,
    current: PressureBand,
    /// Number of times the critical band was entered.
    critical_episodes: u64,
}

impl BandMonitor {
    pub fn new(thresholds: BandThresholds) -> Self {
        Self {
            thresholds,
            current: PressureBand::Normal,
            critical_episodes: 0,
        }
    }

    /// Record an observation. Returns the new band if it changed.
    pub fn observe(&mut self, depth: usize, capacity: usize) -> Option<PressureBand> {
        let band = self.thresholds.classify(depth, capacity);
        if band == self.current {
            return None;
        }

        let previous = self.current;
        self.current = band;
        let utilization = utilization_pct(depth, capacity);

        match band {
            PressureBand::Critical => {
                self.critical_episodes += 1;
                warn!(
                    depth,
                    capacity,
                    utilization,
                    episodes = self.critical_episodes,
                    "Tick queue critical, new ticks will be dropped when full"
                );
            }
            PressureBand::Warning if previous == PressureBand::Normal => {
                warn!(depth, capacity, utilization, "Tick queue under pressure");
            }
            _ => {
                info!(
                    depth,
                    capacity,
                    utilization,
                    from = previous.as_str(),
                    to = band.as_str(),
                    "Tick queue pressure easing"
                );
            }
        }

        Some(band)
    }

    pub fn current(&self) -> PressureBand {
        self.current
    }

    pub fn critical_episodes(&self) -> u64 {
        self.critical_episodes
    }
}
