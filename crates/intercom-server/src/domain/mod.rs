//! Domain layer for intercom-server.
//!
//! Pure configuration types with no I/O.  The session record and message
//! model themselves live in `intercom-core`, shared with any other process
//! that speaks the protocol.

pub mod config;

pub use config::{ConfigValidationError, ServerConfig};
