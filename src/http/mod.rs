//! HTTP application layer.
//!
//! Routing and handlers live outside the lifecycle; this module only holds
//! the small router the binary serves.

pub mod app;

pub use app::app;
