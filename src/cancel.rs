/*!
 * Cooperative cancellation for long-running operations
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PhotocopyError, Result};

/// Shared cancellation flag, cloned into every worker.
///
/// Cancellation is cooperative: the flag is observed before every blocking
/// step, never mid-write.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `Err(Cancelled)` when cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PhotocopyError::Cancelled)
        } else {
            Ok(())
        }
    }
}
