//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{ListenerConfig, ServerConfig};
use crate::config::validation::ValidationError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable {name} has invalid value {value:?}")]
    Env { name: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Variable holding the port to listen on, on all interfaces.
pub const PORT_VAR: &str = "PORT";
/// Variable holding a full `host:port` bind address. Wins over `PORT`.
pub const BIND_ADDRESS_VAR: &str = "BIND_ADDRESS";

/// Parse a configuration from a TOML file without validating it.
pub fn read_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Apply environment overrides using `lookup` to read variables.
///
/// Empty values are treated as unset.
pub fn apply_env_overrides<F>(config: &mut ServerConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |name: &str| lookup(name).filter(|value| !value.is_empty());

    if let Some(value) = lookup(PORT_VAR) {
        let port = value.parse::<u16>().map_err(|_| ConfigError::Env {
            name: PORT_VAR,
            value: value.clone(),
        })?;
        config.listener.bind_address = ListenerConfig::on_port(port).bind_address;
    }

    if let Some(value) = lookup(BIND_ADDRESS_VAR) {
        config.listener.bind_address = value;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn port_sets_wildcard_address() {
        let mut config = ServerConfig::default();
        apply_env_overrides(&mut config, env(&[("PORT", "9000")])).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:9000");
    }

    #[test]
    fn empty_port_keeps_fallback() {
        let mut config = ServerConfig::default();
        apply_env_overrides(&mut config, env(&[("PORT", "")])).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn bind_address_wins_over_port() {
        let mut config = ServerConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[("PORT", "9000"), ("BIND_ADDRESS", "127.0.0.1:7000")]),
        )
        .unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:7000");
    }

    #[test]
    fn invalid_port_is_an_error() {
        let mut config = ServerConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "PORT", .. }));
    }

    #[test]
    fn read_config_leaves_validation_to_the_caller() {
        let dir = std::env::temp_dir().join(format!("serve-lifecycle-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.toml");
        fs::write(&good, "[shutdown]\ndeadline = 0.5\n").unwrap();
        let config = read_config(&good).unwrap();
        assert_eq!(config.shutdown.deadline, Duration::from_millis(500));

        // An invalid address parses; overrides may still replace it.
        let bad = dir.join("bad.toml");
        fs::write(&bad, "[listener]\nbind_address = \"nowhere\"\n").unwrap();
        let mut config = read_config(&bad).unwrap();
        assert!(crate::config::validate_config(&config).is_err());
        apply_env_overrides(&mut config, env(&[("PORT", "9000")])).unwrap();
        assert!(crate::config::validate_config(&config).is_ok());

        let missing = dir.join("missing.toml");
        assert!(matches!(read_config(&missing), Err(ConfigError::Io(_))));

        fs::remove_dir_all(&dir).unwrap();
    }
}
