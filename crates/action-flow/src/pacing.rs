//! Randomized delays between deterministic steps and between units

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Inclusive delay bounds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    pub fn sample(&self) -> Duration {
        if self.min_ms == self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    pub action: DelayRange,
    pub unit: DelayRange,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            action: DelayRange::new(800, 2_000),
            unit: DelayRange::new(3_000, 8_000),
        }
    }
}

impl Pacing {
    pub fn new(action: DelayRange, unit: DelayRange) -> Self {
        Self { action, unit }
    }

    /// No delays at all.
    pub fn none() -> Self {
        Self::new(DelayRange::new(0, 0), DelayRange::new(0, 0))
    }

    /// Pause between two steps of one unit.
    pub async fn between_actions(&self) {
        let delay = self.action.sample();
        trace!(delay_ms = delay.as_millis() as u64, "action pacing");
        tokio::time::sleep(delay).await;
    }

    /// Pause between two units.
    pub async fn between_units(&self) {
        let delay = self.unit.sample();
        trace!(delay_ms = delay.as_millis() as u64, "unit pacing");
        tokio::time::sleep(delay).await;
    }
}
