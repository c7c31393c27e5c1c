//! Per-connection session state.
//!
//! A [`SessionState`] is created together with the server instance for one
//! connection and dropped with it.  Several actors read it concurrently:
//!
//! - the inbound path (one message at a time),
//! - the log relay, called from whichever thread emitted a log record,
//! - the ping watchdog task, which flips the timeout flag.
//!
//! Every field is therefore an atomic or a [`OnceLock`].  No lock is ever held
//! across an `.await`.
//!
//! # Write-once negotiation
//!
//! The client's schema version and name are stored in `OnceLock`s.  The first
//! successful handshake sets them; any later attempt fails with
//! [`ProtocolViolation::AlreadyHandshaken`], so "exactly one handshake per
//! session" is enforced by the type rather than by convention.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::domain::violation::ProtocolViolation;
use crate::protocol::messages::LogLevel;

/// Server-side state for one connected client.
#[derive(Debug, Default)]
pub struct SessionState {
    client_schema_version: OnceLock<u32>,
    client_name: OnceLock<String>,
    handshake_complete: AtomicBool,
    ping_timed_out: AtomicBool,
    /// `LogLevel` as its `u8` discriminant.
    outgoing_log_level: AtomicU8,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Negotiated schema version, or `None` before the handshake.
    pub fn client_schema_version(&self) -> Option<u32> {
        self.client_schema_version.get().copied()
    }

    pub fn client_name(&self) -> Option<&str> {
        self.client_name.get().map(String::as_str)
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.handshake_complete.load(Ordering::Acquire)
    }

    /// Records the negotiated version and name and marks the handshake complete.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::AlreadyHandshaken`] if a version was
    /// already negotiated; the stored values are left untouched.
    pub fn complete_handshake(
        &self,
        client_name: &str,
        schema_version: u32,
    ) -> Result<(), ProtocolViolation> {
        self.client_schema_version
            .set(schema_version)
            .map_err(|_| ProtocolViolation::AlreadyHandshaken)?;
        // The version slot is the gate: whoever set it owns the name slot.
        let _ = self.client_name.set(client_name.to_owned());
        self.handshake_complete.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_ping_timed_out(&self) -> bool {
        self.ping_timed_out.load(Ordering::Acquire)
    }

    /// Marks the session as timed out.  Returns `true` on the first call only.
    pub fn mark_ping_timed_out(&self) -> bool {
        !self.ping_timed_out.swap(true, Ordering::AcqRel)
    }

    pub fn outgoing_log_level(&self) -> LogLevel {
        LogLevel::from_u8(self.outgoing_log_level.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Stores a new relay level and returns the previous one.
    pub fn swap_outgoing_log_level(&self, level: LogLevel) -> LogLevel {
        let previous = self.outgoing_log_level.swap(level as u8, Ordering::AcqRel);
        LogLevel::from_u8(previous).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_unnegotiated() {
        let session = SessionState::new();
        assert_eq!(session.client_schema_version(), None);
        assert_eq!(session.client_name(), None);
        assert!(!session.is_handshake_complete());
        assert!(!session.is_ping_timed_out());
        assert_eq!(session.outgoing_log_level(), LogLevel::Off);
    }

    #[test]
    fn test_complete_handshake_records_version_and_name() {
        let session = SessionState::new();

        session.complete_handshake("panel", 2).unwrap();

        assert!(session.is_handshake_complete());
        assert_eq!(session.client_schema_version(), Some(2));
        assert_eq!(session.client_name(), Some("panel"));
    }

    #[test]
    fn test_second_handshake_is_rejected_and_keeps_first_values() {
        let session = SessionState::new();
        session.complete_handshake("first", 1).unwrap();

        let result = session.complete_handshake("second", 3);

        assert_eq!(result, Err(ProtocolViolation::AlreadyHandshaken));
        assert_eq!(session.client_schema_version(), Some(1));
        assert_eq!(session.client_name(), Some("first"));
    }

    #[test]
    fn test_mark_ping_timed_out_reports_first_transition_only() {
        let session = SessionState::new();
        assert!(session.mark_ping_timed_out());
        assert!(!session.mark_ping_timed_out());
        assert!(session.is_ping_timed_out());
    }

    #[test]
    fn test_swap_log_level_returns_previous() {
        let session = SessionState::new();
        assert_eq!(session.swap_outgoing_log_level(LogLevel::Debug), LogLevel::Off);
        assert_eq!(session.swap_outgoing_log_level(LogLevel::Off), LogLevel::Debug);
        assert_eq!(session.outgoing_log_level(), LogLevel::Off);
    }
}
