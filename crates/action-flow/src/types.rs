//! Core types for retry handling

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds for one [`with_retry`](crate::with_retry) invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total invocations never exceed `max_retries + 1`.
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Growth factor applied per further retry
    pub backoff_multiplier: f64,

    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}
