//! Admission control for command execution.
//!
//! A single [`AdmissionGate`] is shared by every command endpoint, so the
//! concurrency ceiling is global across all command ids.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Why a permit could not be acquired. Surfaced to the client as a
/// diagnostic payload, never as a transport-level error.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("timed out acquiring command slot after {0:?}")]
    Timeout(Duration),
    #[error("command gate is closed")]
    Closed,
}

/// RAII permit for one command execution. Capacity is returned to the
/// gate when the permit is dropped, on every exit path.
#[derive(Debug)]
pub struct CommandPermit {
    _permit: OwnedSemaphorePermit,
}

/// Counting permit pool bounding concurrent command executions.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl AdmissionGate {
    pub fn new(max_concurrent: usize, acquire_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            acquire_timeout,
        }
    }

    /// Wait for a permit, bounded by the configured acquire timeout.
    ///
    /// The wait budget is independent of any remaining budget on the
    /// overall request timeout: a caller that waits the full acquire
    /// timeout is still granted a full execution timeout afterwards.
    pub async fn acquire(&self) -> Result<CommandPermit, AcquireError> {
        match tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => Ok(CommandPermit { _permit: permit }),
            Ok(Err(_)) => Err(AcquireError::Closed),
            Err(_) => Err(AcquireError::Timeout(self.acquire_timeout)),
        }
    }

    #[cfg(test)]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}
