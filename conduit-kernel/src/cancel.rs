//! Cancellation of running executions.

use stage0::ExecutionSignal;
use tokio_util::sync::CancellationToken;

/// Handle the host uses to cancel one execution.
///
/// Clones share the same token. Cancelling aborts every outstanding
/// invocation of the current group and fails the execution with
/// [`KernelError::Cancelled`](stage0::KernelError::Cancelled).
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// A fresh, uncancelled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token, e.g. a child of a server-wide shutdown token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Cancel the execution.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Apply a host signal.
    pub fn signal(&self, signal: &ExecutionSignal) {
        if let ExecutionSignal::Cancel { reason } = signal {
            tracing::info!(reason = %reason, "conduit.execution.cancel_requested");
            self.cancel();
        }
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
