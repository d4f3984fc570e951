//! Cooperative cancellation shared between a sync task and its handle.

use crate::error::FetchError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Cancellation flag checked between network round-trips and storage batches.
///
/// Clones observe the same flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    poll: Duration,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

impl CancelToken {
    /// Creates a token whose [`cancelled`](Self::cancelled) future checks the
    /// flag every `poll`.
    #[must_use]
    pub fn new(poll: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            poll,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` once the token has been cancelled.
    pub fn check(&self) -> Result<(), FetchError> {
        if self.is_cancelled() {
            Err(FetchError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the token is cancelled, at most one poll interval late.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            tokio::time::sleep(self.poll).await;
        }
    }
}
