//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! runner.rs (serving task, RunnerHandle)
//!     → listener.rs (bind, accept loop, connection limits)
//!     → connection.rs (HTTP/1.1 + HTTP/2, timeouts, graceful drain)
//!     → request handler
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Per-connection accept errors never stop the listener

pub mod connection;
pub mod listener;
pub mod runner;

pub use listener::Listener;
pub use runner::{ListenerRunner, RunnerHandle};
