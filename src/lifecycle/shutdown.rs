//! Time-bounded graceful shutdown of a listener runner.

use std::sync::Arc;
use std::time::Duration;

use crate::lifecycle::outcome::ShutdownOutcome;
use crate::net::runner::RunnerHandle;

/// Drives one graceful stop of a runner within a fixed deadline.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownSupervisor {
    deadline: Duration,
}

impl ShutdownSupervisor {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Stop the runner and wait up to the deadline for it to drain.
    ///
    /// Past the deadline the accept task is aborted so the listener is
    /// released; connections still in flight keep running unobserved.
    pub async fn shutdown(&self, runner: &mut RunnerHandle) -> ShutdownOutcome {
        tracing::info!(
            deadline = ?self.deadline,
            active_connections = runner.active_connections(),
            "Graceful shutdown started"
        );

        runner.stop();
        let drained = tokio::time::timeout(self.deadline, runner.drain()).await;

        match drained {
            Ok(Ok(())) => {
                tracing::info!("Graceful shutdown completed");
                ShutdownOutcome::CompletedInTime
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Error during shutdown");
                ShutdownOutcome::CompletedWithError(Arc::new(e))
            }
            Err(_) => {
                runner.abort();
                tracing::warn!(
                    deadline = ?self.deadline,
                    active_connections = runner.active_connections(),
                    "Graceful shutdown timed out"
                );
                ShutdownOutcome::DeadlineExceeded {
                    deadline: self.deadline,
                }
            }
        }
    }
}

impl Default for ShutdownSupervisor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
