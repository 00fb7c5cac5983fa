//! Cancellation token shared between the controller and its background tasks.
//!
//! `Stop` cancels the token of the running session; discovery polling, the
//! immediate-exit probe and the position synchronizer all observe it. Tasks
//! that sleep use [`CancellationToken::cancelled`] inside `tokio::select!`
//! so they wake as soon as cancellation is requested instead of at the end
//! of their current interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::error::EmbedError;

#[derive(Debug, Default)]
struct Shared {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cancellation token for cooperative cancellation of async operations.
///
/// Clones share state: `cancel()` on any clone is observed by all of them.
///
/// # Example
///
/// ```
/// use enginehost_core::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let token_clone = token.clone();
///
/// token_clone.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    shared: Arc<Shared>,
}

impl CancellationToken {
    /// Create a new cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every task waiting in [`cancelled`].
    ///
    /// [`cancelled`]: CancellationToken::cancelled
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancellation is requested.
    ///
    /// Returns immediately if the token is already cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before re-checking the flag so a concurrent cancel()
            // between the check and the await is not lost.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Check cancellation and return an error if cancelled.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }
}

/// Error returned when an operation is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError;

impl std::fmt::Display for CancelledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operation was cancelled")
    }
}

impl std::error::Error for CancelledError {}

impl From<CancelledError> for EmbedError {
    fn from(_: CancelledError) -> Self {
        EmbedError::Cancelled
    }
}
