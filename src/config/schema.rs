//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lifecycle::signals::TerminationSignal;

/// Root configuration for the server lifecycle.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Per-connection timeouts.
    pub timeouts: TimeoutConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl ListenerConfig {
    /// Fallback port used when neither a file nor the environment names one.
    pub const DEFAULT_PORT: u16 = 8080;

    /// Listen on all interfaces at `port`.
    pub fn on_port(port: u16) -> Self {
        Self {
            bind_address: format!("0.0.0.0:{port}"),
            max_connections: 10_000,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::on_port(Self::DEFAULT_PORT)
    }
}

/// Timeout configuration applied to every accepted connection.
///
/// Values are seconds in config files; fractions are accepted.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to receive a request's headers.
    ///
    /// Only the request head is bounded. Reading the body is up to the
    /// handler and counts against `write`.
    #[serde(with = "secs")]
    pub read: Duration,

    /// Time allowed to produce a response once the request head has been read.
    ///
    /// A late handler is answered with 503 but is not cancelled; shutdown
    /// still waits for it to return.
    #[serde(with = "secs")]
    pub write: Duration,

    /// Time a keep-alive connection may sit without an in-flight request.
    #[serde(with = "secs")]
    pub idle: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(10),
            write: Duration::from_secs(10),
            idle: Duration::from_secs(120),
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Maximum time allotted to draining in-flight requests.
    #[serde(with = "secs")]
    pub deadline: Duration,

    /// Termination signals that start a graceful shutdown.
    pub signals: Vec<TerminationSignal>,

    /// Treat a repeated signal during shutdown as a request to exit now.
    pub force_on_repeat: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(30),
            signals: TerminationSignal::ALL.to_vec(),
            force_on_repeat: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, for development.
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

/// (De)serialize a `Duration` as a number of seconds.
mod secs {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.timeouts.read, Duration::from_secs(10));
        assert_eq!(config.timeouts.write, Duration::from_secs(10));
        assert_eq!(config.timeouts.idle, Duration::from_secs(120));
        assert_eq!(config.shutdown.deadline, Duration::from_secs(30));
        assert_eq!(config.shutdown.signals.len(), 4);
    }

    #[test]
    fn parses_partial_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            [timeouts]
            write = 2.5

            [shutdown]
            deadline = 5
            signals = ["interrupt", "terminate"]
            "#,
        )
        .unwrap();

        assert_eq!(config.timeouts.write, Duration::from_millis(2500));
        assert_eq!(config.timeouts.read, Duration::from_secs(10));
        assert_eq!(config.shutdown.deadline, Duration::from_secs(5));
        assert_eq!(
            config.shutdown.signals,
            vec![TerminationSignal::Interrupt, TerminationSignal::Terminate]
        );
        assert!(config.shutdown.force_on_repeat);
    }

    #[test]
    fn rejects_negative_durations() {
        let parsed: Result<ServerConfig, _> = toml::from_str("[shutdown]\ndeadline = -1\n");
        assert!(parsed.is_err());
    }
}
