//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (PORT, BIND_ADDRESS)
//!     → command line overrides (binary only)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, owned by the coordinator)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Durations are written as seconds and may be fractional

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env_overrides, read_config, ConfigError};
pub use schema::{
    ListenerConfig, LogFormat, ObservabilityConfig, ServerConfig, ShutdownConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
