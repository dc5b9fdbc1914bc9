//! Configuration for the trigger reconciler

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconciler configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Upper bound on a single trigger activation
    pub activation_timeout_ms: u64,
    /// Upper bound on a single trigger deactivation
    pub deactivation_timeout_ms: u64,
    /// Publish lifecycle and container events when a bus is attached
    pub publish_events: bool,
}

impl ReconcilerConfig {
    #[must_use]
    pub fn activation_timeout(&self) -> Duration {
        Duration::from_millis(self.activation_timeout_ms)
    }

    #[must_use]
    pub fn deactivation_timeout(&self) -> Duration {
        Duration::from_millis(self.deactivation_timeout_ms)
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            activation_timeout_ms: 10_000,
            deactivation_timeout_ms: 10_000,
            publish_events: true,
        }
    }
}
