//! HTTP server lifecycle coordination.
//!
//! Starts a listener for an arbitrary request handler, waits for the first
//! of a termination signal or a fatal serve error, drives a time-bounded
//! graceful shutdown and reports exactly one classified result.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────── Coordinator ────────────────────────┐
//!                 │                                                             │
//!  OS signals ───▶│  SignalWatcher ──┐                                          │
//!  (or trigger)   │                  ├─▶ first wins ─▶ ShutdownSupervisor ──┐   │
//!                 │  ListenerRunner ─┘                   (deadline race)    │   │
//!  TCP clients ──▶│   accept loop + connections                             ▼   │
//!                 │                                      classify ─▶ LifecycleResult
//!                 └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use serve_lifecycle::{http, run_server, ServerConfig};
//!
//! # async fn demo() {
//! let result = run_server(ServerConfig::default(), http::app()).await;
//! std::process::exit(result.exit_code());
//! # }
//! ```

// Core subsystems
pub mod config;
pub mod lifecycle;
pub mod net;

// Application and cross-cutting concerns
pub mod http;
pub mod observability;

pub use config::ServerConfig;
pub use lifecycle::{run_server, Coordinator, LifecycleError, LifecycleResult};
