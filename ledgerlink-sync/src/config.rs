//! Sync engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for network access and sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// How often a pending network call checks for cancellation.
    pub cancel_poll_ms: u64,
    /// Progress events buffered before new ones are dropped.
    pub progress_buffer: usize,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            cancel_poll_ms: 250,
            progress_buffer: 64,
            user_agent: format!("ledgerlink/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn cancel_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cancel_poll_ms.max(1))
    }
}
