//! Intercom server entry point.
//!
//! Accepts WebSocket connections from device-control clients and runs one
//! protocol session per connection: handshake and schema negotiation, ping
//! watchdog, echo, log relay, and delegation of device requests to the
//! in-memory device registry.
//!
//! # Usage
//!
//! ```text
//! intercom-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>        TOML configuration file
//!   --port <PORT>          Listener port (overrides the config file)
//!   --bind <IP>            Listener address (overrides the config file)
//!   --server-name <NAME>   Name announced in ServerInfo
//!   --max-ping-ms <MS>     Ping watchdog interval, 0 disables it
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                | Description                    |
//! |-------------------------|--------------------------------|
//! | `INTERCOM_CONFIG`       | Configuration file path        |
//! | `INTERCOM_PORT`         | Listener port                  |
//! | `INTERCOM_BIND`         | Listener address               |
//! | `INTERCOM_SERVER_NAME`  | Server name                    |
//! | `INTERCOM_MAX_PING_MS`  | Ping watchdog interval (ms)    |
//! | `RUST_LOG`              | Console log filter             |
//!
//! CLI arguments take precedence over environment variables, which take
//! precedence over the config file.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use intercom_server::domain::ServerConfig;
use intercom_server::infrastructure::{load_config, run_server, AppConfig, DeviceRegistry, LogHub};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Intercom device-control protocol server.
#[derive(Debug, Parser)]
#[command(
    name = "intercom-server",
    about = "Session server for the Intercom device-control protocol",
    version
)]
struct Cli {
    /// TOML configuration file.  A missing file means built-in defaults.
    #[arg(long, env = "INTERCOM_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port for the WebSocket listener.
    #[arg(long, env = "INTERCOM_PORT")]
    port: Option<u16>,

    /// IP address to bind the WebSocket listener to.
    ///
    /// Use `0.0.0.0` to accept connections from any interface.
    #[arg(long, env = "INTERCOM_BIND")]
    bind: Option<IpAddr>,

    /// Name announced to clients in `ServerInfo`.
    #[arg(long, env = "INTERCOM_SERVER_NAME")]
    server_name: Option<String>,

    /// Maximum time between client pings in milliseconds; 0 disables the watchdog.
    #[arg(long, env = "INTERCOM_MAX_PING_MS")]
    max_ping_ms: Option<u64>,
}

impl Cli {
    /// Applies CLI overrides on top of the file configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged configuration fails validation.
    fn merge(&self, file: &AppConfig) -> anyhow::Result<ServerConfig> {
        let mut config = file
            .to_server_config()
            .context("invalid [server] section in config file")?;

        if let Some(ip) = self.bind {
            config.bind_addr = SocketAddr::new(ip, config.bind_addr.port());
        }
        if let Some(port) = self.port {
            config.bind_addr.set_port(port);
        }
        if let Some(name) = &self.server_name {
            config.server_name = name.clone();
        }
        if let Some(ms) = self.max_ping_ms {
            config.max_ping_interval = Duration::from_millis(ms);
        }

        config.validate().context("invalid server configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    let config = cli.merge(&file)?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // The console honours RUST_LOG (or the file's log_level).  The hub layer
    // admits every level of the intercom crates; each session applies its own
    // client-requested level.
    let hub = LogHub::new();
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&file.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(hub.layer())
        .init();

    let devices = Arc::new(DeviceRegistry::new(file.device_infos()));
    info!(
        server_name = %config.server_name,
        addr = %config.bind_addr,
        max_ping_ms = config.max_ping_interval_ms(),
        max_schema_version = config.max_schema_version,
        devices = devices.devices().len(),
        "intercom server starting"
    );

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    run_server(config, hub, devices, running).await?;

    info!("intercom server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_keep_file_values() {
        // Arrange
        let cli = Cli::parse_from(["intercom-server"]);
        let mut file = AppConfig::default();
        file.server.server_name = "From File".to_string();
        file.server.max_ping_interval_ms = 250;

        // Act
        let config = cli.merge(&file).expect("valid");

        // Assert
        assert_eq!(config.server_name, "From File");
        assert_eq!(config.max_ping_interval, Duration::from_millis(250));
        assert_eq!(config.bind_addr, ServerConfig::default().bind_addr);
    }

    #[test]
    fn test_cli_overrides_file_values() {
        let cli = Cli::parse_from([
            "intercom-server",
            "--port",
            "4000",
            "--bind",
            "0.0.0.0",
            "--server-name",
            "CLI",
            "--max-ping-ms",
            "100",
        ]);

        let config = cli.merge(&AppConfig::default()).expect("valid");

        assert_eq!(config.bind_addr, "0.0.0.0:4000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.server_name, "CLI");
        assert_eq!(config.max_ping_interval_ms(), 100);
    }

    #[test]
    fn test_blank_server_name_from_cli_is_rejected() {
        let cli = Cli::parse_from(["intercom-server", "--server-name", " "]);
        assert!(cli.merge(&AppConfig::default()).is_err());
    }

    #[test]
    fn test_invalid_bind_is_rejected_by_parser() {
        assert!(Cli::try_parse_from(["intercom-server", "--bind", "not-an-ip"]).is_err());
    }
}
