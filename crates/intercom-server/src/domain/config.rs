//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for the settings every
//! session needs: the identity announced in `ServerInfo`, the ping watchdog
//! interval, and the newest schema version the server accepts.
//!
//! It is a plain struct with no environment or file reads; the
//! infrastructure layer populates it from the config file and CLI arguments.

use std::net::SocketAddr;
use std::time::Duration;

use intercom_core::CURRENT_SCHEMA_VERSION;
use thiserror::Error;

/// A configuration value the server cannot run with.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("max_schema_version {requested} exceeds the newest supported version {supported}")]
    SchemaVersionUnsupported { requested: u32, supported: u32 },

    #[error("server_name must not be empty")]
    EmptyServerName,
}

/// All runtime configuration for a protocol server.
///
/// Build this once at startup and clone it into each connection's
/// [`crate::application::ProtocolServer`].
///
/// # Example
///
/// ```rust
/// use intercom_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 12345);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Name reported to clients in `ServerInfo`.
    pub server_name: String,

    /// Maximum time a client may go without sending `Ping`.
    ///
    /// `Duration::ZERO` disables the watchdog entirely.
    pub max_ping_interval: Duration,

    /// Newest message schema version the server will negotiate.
    ///
    /// Clients announcing a newer version are rejected at handshake.
    pub max_schema_version: u32,

    /// Address the WebSocket transport binds to.
    pub bind_addr: SocketAddr,
}

impl ServerConfig {
    /// Checks the configuration for values no session could honour.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigValidationError`] describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.server_name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyServerName);
        }
        if self.max_schema_version > CURRENT_SCHEMA_VERSION {
            return Err(ConfigValidationError::SchemaVersionUnsupported {
                requested: self.max_schema_version,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    /// Ping interval in whole milliseconds, as announced in `ServerInfo`.
    pub fn max_ping_interval_ms(&self) -> u64 {
        u64::try_from(self.max_ping_interval.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for ServerConfig {
    /// | Field              | Default                  |
    /// |--------------------|--------------------------|
    /// | server_name        | `"Intercom Server"`      |
    /// | max_ping_interval  | disabled                 |
    /// | max_schema_version | `CURRENT_SCHEMA_VERSION` |
    /// | bind_addr          | `127.0.0.1:12345`        |
    fn default() -> Self {
        Self {
            server_name: "Intercom Server".to_string(),
            max_ping_interval: Duration::ZERO,
            max_schema_version: CURRENT_SCHEMA_VERSION,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 12345)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
