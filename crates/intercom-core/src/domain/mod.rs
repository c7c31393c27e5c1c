//! Domain entities for Intercom.
//!
//! This module contains pure session rules with no infrastructure dependencies.
//!
//! # What lives here? (for beginners)
//!
//! The domain layer is the innermost ring of the architecture.  It has no
//! sockets, no async runtime, and no logging backend, so everything in it can
//! be unit-tested on any machine without setup.  For Intercom that means:
//!
//! - **`session`** – the per-connection record: negotiated schema version,
//!   client name, handshake and ping-timeout flags, relayed log level.
//! - **`violation`** – the ways a client can break session ordering rules, and
//!   how each one is reported back as an `Error` message.
//!
//! The server crate's application layer reads and writes this state; the domain
//! never depends on it.

pub mod session;
pub mod violation;
