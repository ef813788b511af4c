//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGHUP/SIGINT/SIGTERM/SIGQUIT or manual trigger → one termination request
//!     repeated signal → forced-exit request (optional)
//!
//! Coordinator (coordinator.rs):
//!     start runner + watcher → race { serve outcome, termination } → shutdown
//!     → classify (outcome.rs)
//!
//! Shutdown (shutdown.rs):
//!     stop accepting → drain connections → give up at the deadline
//! ```
//!
//! # Design Decisions
//! - Shutdown runs on every path, including serve failures
//! - Shutdown has a deadline; a timeout always wins the classification
//! - Nothing here exits the process; the caller acts on the result

pub mod coordinator;
pub mod outcome;
pub mod shutdown;
pub mod signals;

pub use coordinator::{run_server, Coordinator, LifecycleReport, LifecycleState, StopCause};
pub use outcome::{
    LifecycleError, LifecycleResult, ServeError, ServeOutcome, ShutdownError, ShutdownOutcome,
};
pub use shutdown::ShutdownSupervisor;
pub use signals::{SignalWatcher, TerminationSignal, TerminationTrigger};
