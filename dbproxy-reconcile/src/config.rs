//! Reconciler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default delay between two stabilization polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Default number of waiting polls before a run times out (~20 minutes).
pub const DEFAULT_MAX_STABILIZATION_RETRIES: u32 = 240;

/// Tunables shared by all resource families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Fixed delay the scheduler should wait before re-invoking a polling run.
    pub poll_interval_ms: u64,
    /// Retry budget granted on every phase transition.
    pub max_stabilization_retries: u32,
}

impl ReconcilerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_stabilization_retries: DEFAULT_MAX_STABILIZATION_RETRIES,
        }
    }
}
