//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that parse but cannot run:
//! an unparseable bind address, zero timeouts or an empty signal set. All
//! problems are reported together rather than stopping at the first.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The bind address is not a `host:port` socket address.
    #[error("listener.bind_address {0:?} is not a valid socket address")]
    BindAddress(String),

    /// The listener could never accept a connection.
    #[error("listener.max_connections must be greater than zero")]
    NoConnections,

    /// A timeout that must be positive is zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// No termination signal would ever start a shutdown.
    #[error("shutdown.signals must name at least one signal")]
    NoSignals,
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::NoConnections);
    }

    let durations = [
        ("timeouts.read", config.timeouts.read),
        ("timeouts.write", config.timeouts.write),
        ("timeouts.idle", config.timeouts.idle),
        ("shutdown.deadline", config.shutdown.deadline),
    ];
    for (name, value) in durations {
        if value == Duration::ZERO {
            errors.push(ValidationError::ZeroDuration(name));
        }
    }

    if config.shutdown.signals.is_empty() {
        errors.push(ValidationError::NoSignals);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
