//! TOML configuration file for the server binary.
//!
//! Every field has a serde default, so an empty or missing file yields a
//! working configuration:
//!
//! ```toml
//! log_level = "debug"
//!
//! [server]
//! server_name = "Lab Rig"
//! max_ping_interval_ms = 1000
//! max_schema_version = 3
//! bind_address = "0.0.0.0:12345"
//!
//! [[devices]]
//! name = "Test Vibrator"
//! features = [{ command = "Vibrate", step_count = 20 }]
//! ```
//!
//! `[[devices]]` entries seed the in-memory device registry.  A device's
//! index is its position in the list.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use intercom_core::protocol::messages::{DeviceFeature, DeviceInfoV3};
use intercom_core::CURRENT_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ConfigValidationError, ServerConfig};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid bind address {address:?}: {source}")]
    BindAddress {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error(transparent)]
    Invalid(#[from] ConfigValidationError),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    /// `tracing` filter for console output, e.g. `"info"` or `"intercom_server=debug"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_server_name")]
    pub server_name: String,
    /// `0` disables the ping watchdog.
    #[serde(default)]
    pub max_ping_interval_ms: u64,
    #[serde(default = "default_max_schema_version")]
    pub max_schema_version: u32,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub features: Vec<FeatureEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureEntry {
    pub command: String,
    pub step_count: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_server_name() -> String {
    ServerConfig::default().server_name
}
fn default_max_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}
fn default_bind_address() -> String {
    ServerConfig::default().bind_addr.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            log_level: default_log_level(),
            devices: Vec::new(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            max_ping_interval_ms: 0,
            max_schema_version: default_max_schema_version(),
            bind_address: default_bind_address(),
        }
    }
}

impl AppConfig {
    /// Converts the `[server]` section into a validated [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::BindAddress`] if `bind_address` is not `ip:port`, and
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let bind_addr: SocketAddr =
            self.server
                .bind_address
                .parse()
                .map_err(|source| ConfigError::BindAddress {
                    address: self.server.bind_address.clone(),
                    source,
                })?;
        let config = ServerConfig {
            server_name: self.server.server_name.clone(),
            max_ping_interval: Duration::from_millis(self.server.max_ping_interval_ms),
            max_schema_version: self.server.max_schema_version,
            bind_addr,
        };
        config.validate()?;
        Ok(config)
    }

    /// Device descriptions for the registry, indexed by list position.
    pub fn device_infos(&self) -> Vec<DeviceInfoV3> {
        self.devices
            .iter()
            .enumerate()
            .map(|(index, entry)| DeviceInfoV3 {
                device_index: index as u32,
                device_name: entry.name.clone(),
                display_name: entry.display_name.clone(),
                features: entry
                    .features
                    .iter()
                    .map(|f| DeviceFeature {
                        command: f.command.clone(),
                        step_count: f.step_count,
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Loads `AppConfig` from `path`.
///
/// `None`, or a path that does not exist, yields `AppConfig::default()`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };

    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        // Arrange / Act
        let cfg: AppConfig = toml::from_str("").expect("parse");

        // Assert
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.devices.is_empty());
    }

    #[test]
    fn test_default_converts_to_default_server_config() {
        let server = AppConfig::default().to_server_config().expect("valid");
        let expected = ServerConfig::default();
        assert_eq!(server.server_name, expected.server_name);
        assert_eq!(server.bind_addr, expected.bind_addr);
        assert_eq!(server.max_schema_version, CURRENT_SCHEMA_VERSION);
        assert!(server.max_ping_interval.is_zero());
    }

    #[test]
    fn test_full_file_is_parsed() {
        // Arrange
        let text = r#"
            log_level = "debug"

            [server]
            server_name = "Lab Rig"
            max_ping_interval_ms = 1000
            max_schema_version = 2
            bind_address = "0.0.0.0:4000"

            [[devices]]
            name = "Test Vibrator"
            features = [
                { command = "Vibrate", step_count = 20 },
                { command = "Vibrate", step_count = 10 },
            ]

            [[devices]]
            name = "Stroker"
            display_name = "Living Room"
        "#;

        // Act
        let cfg: AppConfig = toml::from_str(text).expect("parse");
        let server = cfg.to_server_config().expect("valid");
        let devices = cfg.device_infos();

        // Assert
        assert_eq!(server.server_name, "Lab Rig");
        assert_eq!(server.max_ping_interval, Duration::from_millis(1000));
        assert_eq!(server.max_schema_version, 2);
        assert_eq!(server.bind_addr.port(), 4000);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].device_index, 0);
        assert_eq!(devices[0].features.len(), 2);
        assert_eq!(devices[1].device_index, 1);
        assert_eq!(devices[1].display_name.as_deref(), Some("Living Room"));
    }

    #[test]
    fn test_unsupported_schema_version_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.server.max_schema_version = CURRENT_SCHEMA_VERSION + 1;
        assert!(matches!(
            cfg.to_server_config(),
            Err(ConfigError::Invalid(ConfigValidationError::SchemaVersionUnsupported { .. }))
        ));
    }

    #[test]
    fn test_bad_bind_address_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.server.bind_address = "localhost".to_string();
        assert!(matches!(
            cfg.to_server_config(),
            Err(ConfigError::BindAddress { .. })
        ));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = toml::from_str::<AppConfig>("[server").unwrap_err();
        assert!(!ConfigError::from(err).to_string().is_empty());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!("intercom-missing-{}.toml", std::process::id()));
        assert_eq!(load_config(Some(&path)).expect("default"), AppConfig::default());
        assert_eq!(load_config(None).expect("default"), AppConfig::default());
    }

    #[test]
    fn test_existing_file_is_loaded() {
        let path = std::env::temp_dir().join(format!("intercom-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[server]\nserver_name = \"From Disk\"\n").expect("write");

        let cfg = load_config(Some(&path)).expect("load");
        let _ = std::fs::remove_file(&path);

        assert_eq!(cfg.server.server_name, "From Disk");
    }
}
