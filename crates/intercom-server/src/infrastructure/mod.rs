//! Infrastructure layer for intercom-server.
//!
//! The infrastructure layer handles all I/O and process-global state.
//!
//! # Responsibilities
//!
//! - Binding the TCP listener and upgrading connections to WebSocket (`ws_server`)
//! - Turning `tracing` events into relayable log records (`log_hub`)
//! - Reading the TOML configuration file (`config_file`)
//! - The in-memory device registry the binary runs with (`device_registry`)
//!
//! # What does NOT belong here?
//!
//! - Protocol rules and dispatch (that is the application layer)
//! - Message type definitions (that is `intercom-core`)

pub mod config_file;
pub mod device_registry;
pub mod log_hub;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use config_file::{load_config, AppConfig, ConfigError};
pub use device_registry::{DeviceError, DeviceRegistry};
pub use log_hub::{LogHub, LogHubLayer};
pub use ws_server::{run_server, serve};
