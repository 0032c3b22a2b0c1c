use crate::{DiscoveryError, Result};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// A non-fatal error recorded against the component that produced it.
#[derive(Debug, Clone)]
pub struct ProcessError {
    pub source: String,
    pub error: DiscoveryError,
}

/// Per-build-run context: a cancellation token plus the errors accumulated
/// along the way.
///
/// One context is created for each build pass (incremental drain or full
/// rebuild) and discarded afterwards; errors are drained by the caller once
/// the pass finishes.
#[derive(Debug)]
pub struct ProcessContext {
    cancel: CancellationToken,
    errors: Mutex<Vec<ProcessError>>,
}

impl ProcessContext {
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Context with a fresh, never-cancelled token.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(CancellationToken::new())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cooperative checkpoint: `Err(Cancelled)` once the token fired.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(DiscoveryError::Cancelled)
        } else {
            Ok(())
        }
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn record_error(&self, source: impl Into<String>, error: DiscoveryError) {
        self.errors.lock().push(ProcessError {
            source: source.into(),
            error,
        });
    }

    /// Snapshot of the recorded errors, in recording order.
    #[must_use]
    pub fn errors(&self) -> Vec<ProcessError> {
        self.errors.lock().clone()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }
}
