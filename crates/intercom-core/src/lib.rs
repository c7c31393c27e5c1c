//! # intercom-core
//!
//! Shared library for Intercom containing the protocol message model, the
//! schema downgrade table, the JSON codec, and the per-connection session
//! record.
//!
//! It has zero dependencies on sockets, async runtimes, or device drivers.
//!
//! # Architecture overview (for beginners)
//!
//! Intercom is the session layer of a device-control server.  A client opens
//! a connection, introduces itself with a `Handshake` that names the message
//! schema version it speaks, and from then on sends requests that the server
//! either answers itself (ping, echo, log control) or hands to the device
//! subsystem.  Everything the server sends back is rewritten into the schema
//! version the client declared.
//!
//! This crate (`intercom-core`) holds the pieces every side agrees on:
//!
//! - **`protocol`** – The closed [`Message`] enum, the downgrade table that
//!   rewrites versioned messages into older layouts, and the JSON text codec.
//!
//! - **`domain`** – [`SessionState`], the per-connection record, and
//!   [`ProtocolViolation`], the rules a client can break.

pub mod domain;
pub mod protocol;

pub use domain::session::SessionState;
pub use domain::violation::ProtocolViolation;
pub use protocol::codec::{decode_message, encode_message, CodecError};
pub use protocol::downgrade::{downgrade, negotiate, DowngradeError};
pub use protocol::messages::{
    ErrorClass, LogLevel, Message, MessageKind, CURRENT_SCHEMA_VERSION, SERVER_MESSAGE_ID,
};
