//! Cooperative cancellation of compilation attempts.
//!
//! Every stage checks the token after each suspension point and stops with
//! [`Cancelled`] once it is set. Cancellation is never reported as an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Marker returned by a stage that observed cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("compilation attempt cancelled")]
pub struct Cancelled;

/// Shared flag signalling that an attempt has been superseded.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a live token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token as cancelled. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` if the token is set.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] when the attempt has been superseded.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
