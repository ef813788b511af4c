//! Outcome types for a single server run and the rule that merges them.
//!
//! # Classification
//! ```text
//! ShutdownOutcome::DeadlineExceeded      → LifecycleResult::ShutdownTimedOut
//! ShutdownOutcome::CompletedWithError(e) → LifecycleResult::Error(serve error + e)
//! ServeOutcome::Failed(e)                → LifecycleResult::Error(e)
//! anything else                          → LifecycleResult::Success
//! ```
//! Checked in that order. A timeout masks everything else; a serve failure
//! is never hidden by a clean shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Why the listener stopped serving.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The listener could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting connections failed with a non-recoverable error.
    #[error("failed to accept on {address}: {source}")]
    Accept {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The serving task ended without reporting an outcome.
    #[error("serve task ended without reporting an outcome")]
    Aborted,
}

/// State of the listener, as published by the runner.
#[derive(Debug, Clone, Default)]
pub enum ServeOutcome {
    /// Still serving (or not yet bound).
    #[default]
    Running,
    /// Stopped because shutdown was requested.
    ClosedNormally,
    /// Stopped on its own because of a fatal error.
    Failed(Arc<ServeError>),
}

impl ServeOutcome {
    /// Whether the runner has stopped.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ServeOutcome::Running)
    }

    /// The serve-time failure, if any. `ClosedNormally` is not a failure.
    pub fn failure(&self) -> Option<&Arc<ServeError>> {
        match self {
            ServeOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ServeError> for ServeOutcome {
    fn from(error: ServeError) -> Self {
        ServeOutcome::Failed(Arc::new(error))
    }
}

/// Errors raised by the stop sequence itself, as opposed to being slow.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The accept task panicked or was cancelled before it could stop.
    #[error("serve task failed while stopping: {0}")]
    ServeTask(#[from] tokio::task::JoinError),
}

/// How the graceful stop went.
#[derive(Debug, Clone)]
pub enum ShutdownOutcome {
    /// Every connection finished before the deadline.
    CompletedInTime,
    /// The deadline elapsed first; draining continues unobserved.
    DeadlineExceeded { deadline: Duration },
    /// The stop sequence finished in time but reported an error.
    CompletedWithError(Arc<ShutdownError>),
}

/// The final failure of a run, with every contributing cause kept.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Termination signal handlers could not be installed; nothing was started.
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    /// The listener failed while serving. Shutdown itself succeeded.
    #[error("server exited with error: {0}")]
    Serve(#[source] Arc<ServeError>),

    /// The stop sequence failed, possibly after a serve failure.
    #[error("error during shutdown: {source}{}", serve_suffix(.serve))]
    Shutdown {
        serve: Option<Arc<ServeError>>,
        #[source]
        source: Arc<ShutdownError>,
    },

    /// Graceful shutdown did not finish within its deadline.
    #[error("graceful shutdown timed out after {0:?}")]
    ShutdownTimedOut(Duration),
}

fn serve_suffix(serve: &Option<Arc<ServeError>>) -> String {
    match serve {
        Some(e) => format!("; server exited with error: {e}"),
        None => String::new(),
    }
}

/// The single value a run reports to its caller.
#[derive(Debug)]
pub enum LifecycleResult {
    Success,
    ShutdownTimedOut { deadline: Duration },
    Error(LifecycleError),
}

impl LifecycleResult {
    /// Merge the raced serve outcome with the shutdown outcome.
    ///
    /// `serve` is whatever the runner had reported when the run stopped
    /// waiting; it is `Running` when a termination signal won the race.
    pub fn classify(serve: &ServeOutcome, shutdown: &ShutdownOutcome) -> Self {
        match shutdown {
            ShutdownOutcome::DeadlineExceeded { deadline } => {
                LifecycleResult::ShutdownTimedOut {
                    deadline: *deadline,
                }
            }
            ShutdownOutcome::CompletedWithError(source) => {
                LifecycleResult::Error(LifecycleError::Shutdown {
                    serve: serve.failure().cloned(),
                    source: Arc::clone(source),
                })
            }
            ShutdownOutcome::CompletedInTime => match serve.failure() {
                Some(e) => LifecycleResult::Error(LifecycleError::Serve(Arc::clone(e))),
                None => LifecycleResult::Success,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, LifecycleResult::Success)
    }

    /// Process exit status a host binary should use.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// Convert into a `Result`, folding a timeout into [`LifecycleError`].
    pub fn into_result(self) -> Result<(), LifecycleError> {
        match self {
            LifecycleResult::Success => Ok(()),
            LifecycleResult::ShutdownTimedOut { deadline } => {
                Err(LifecycleError::ShutdownTimedOut(deadline))
            }
            LifecycleResult::Error(e) => Err(e),
        }
    }
}
