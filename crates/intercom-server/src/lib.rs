//! intercom-server library crate.
//!
//! The session layer of the Intercom device-control server: everything that
//! happens between a client connecting and its device requests reaching the
//! device subsystem.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Client (JSON over WebSocket)
//!         ↕
//! [intercom-server]
//!   ├── domain/           ServerConfig
//!   ├── application/      Session gate, dispatcher, outgoing channel,
//!   │                     log relay, ping watchdog, DeviceHandler seam
//!   └── infrastructure/
//!         ├── ws_server/        WebSocket accept loop (tokio-tungstenite)
//!         ├── log_hub/          tracing layer feeding the log relays
//!         ├── config_file/      TOML configuration
//!         └── device_registry/  in-memory DeviceHandler
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `intercom-core`; it spawns the
//!   ping watchdog task but opens no sockets.
//! - `infrastructure` depends on all other layers plus `tokio-tungstenite`
//!   and `tracing-subscriber`.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: per-connection protocol logic.
pub mod application;

/// Infrastructure layer: WebSocket server, log hub, config file, device registry.
pub mod infrastructure;
