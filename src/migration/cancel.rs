use crate::core::{MigrationError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Objects transformed between two cancellation checks inside a step.
pub use crate::mapping::transform::PROGRESS_INTERVAL as CANCEL_CHECK_INTERVAL;

/// Cooperative cancellation flag shared between a migration and its caller.
///
/// The executor checks it before every step and periodically while a step
/// transforms objects. Cancelling after the final replacement has no effect.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MigrationError::Cancelled)
        } else {
            Ok(())
        }
    }
}
