//! Application layer for intercom-server.
//!
//! The application layer owns the per-connection protocol logic: it knows
//! *what* to do with each message, but delegates *how* bytes move and
//! devices are driven to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Gating inbound messages on session state (`gate`)
//! - Dispatching messages to their handlers (`server`)
//! - Normalising every outgoing message to the client's schema (`outgoing`)
//! - Relaying server log output at the client's chosen level (`log_relay`)
//! - Enforcing the ping deadline (`ping_timer`)
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - Installing the global tracing subscriber (that happens in `main.rs`)
//! - Talking to hardware (behind the [`DeviceHandler`] trait)

pub mod device;
pub mod gate;
pub mod log_relay;
pub mod outgoing;
pub mod ping_timer;
pub mod server;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use device::DeviceHandler;
pub use log_relay::{LogListener, LogRecord, LogRelay, LogSink, SubscriptionId};
pub use outgoing::OutgoingChannel;
pub use ping_timer::PingTimer;
pub use server::ProtocolServer;

/// Locks `mutex`, recovering the guard if a previous holder panicked.
///
/// Every value guarded in this layer stays consistent across a panic, so a
/// poisoned lock carries no extra information.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
