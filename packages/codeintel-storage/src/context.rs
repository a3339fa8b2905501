//! Cooperative cancellation token threaded through every blocking operation.
//!
//! The engine has no async runtime (see the concurrency design): instead of
//! polling a future, long-running calls check `CancellationContext::is_cancelled`
//! at natural yield points (between rows of a batch, between files of a walk)
//! and return `Error::cancelled` promptly when set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct CancellationContext {
    flag: Arc<AtomicBool>,
}

impl CancellationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(Error::cancelled)` if this context has been cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::cancelled("operation cancelled"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_context_not_cancelled() {
        let ctx = CancellationContext::new();
        assert!(!ctx.is_cancelled());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn test_cancel_propagates_through_clones() {
        let ctx = CancellationContext::new();
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.check().is_err());
    }
}
