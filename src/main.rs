//! `serve-lifecycle` binary: serves the demo router under the lifecycle
//! coordinator and exits non-zero on any failed run.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serve_lifecycle::config::{
    apply_env_overrides, read_config, validate_config, ConfigError, ListenerConfig, LogFormat,
    ServerConfig,
};
use serve_lifecycle::{http, observability, Coordinator};

#[derive(Parser)]
#[command(name = "serve-lifecycle")]
#[command(about = "HTTP server with signal-driven graceful shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, on all interfaces. Overrides PORT.
    #[arg(short, long)]
    port: Option<u16>,

    /// Graceful shutdown deadline in seconds.
    #[arg(long, value_name = "SECS")]
    shutdown_deadline: Option<f64>,

    /// Log output format.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// File, then environment, then command line; validated last.
    fn resolve(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ServerConfig::default(),
        };

        apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

        if let Some(port) = self.port {
            config.listener.bind_address = ListenerConfig::on_port(port).bind_address;
        }
        if let Some(secs) = self.shutdown_deadline {
            config.shutdown.deadline = Duration::try_from_secs_f64(secs)?;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.resolve()?;

    observability::logging::init(&config.observability)?;

    tracing::info!("serve-lifecycle v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        read_timeout = ?config.timeouts.read,
        write_timeout = ?config.timeouts.write,
        idle_timeout = ?config.timeouts.idle,
        shutdown_deadline = ?config.shutdown.deadline,
        "Configuration loaded"
    );

    let coordinator = Coordinator::new(config, http::app());

    let forced = coordinator.forced_exit();
    tokio::spawn(async move {
        forced.cancelled().await;
        tracing::error!("Forced exit requested, not waiting for shutdown");
        std::process::exit(1);
    });

    coordinator.run().await.into_result()?;

    tracing::info!("Shutdown complete");
    Ok(())
}
