//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! lifecycle, net (tracing events with structured fields, lifecycle span)
//!     → logging.rs (subscriber: env filter + pretty or JSON formatter)
//!     → stdout
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Connection IDs and the lifecycle span flow through all events

pub mod logging;
