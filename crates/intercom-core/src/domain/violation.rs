//! Session-ordering violations and their mapping to protocol errors.

use thiserror::Error;

use crate::protocol::messages::{ErrorClass, Message, MessageKind};

/// A rule a client broke; reported back as an `Error` message, never a failure
/// of the server itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// Id 0 belongs to server-originated messages.
    #[error("message id 0 is reserved for server-originated messages")]
    ReservedId,

    /// The ping watchdog fired; the session no longer processes input.
    #[error("ping timed out, session no longer accepts messages")]
    PingTimedOut,

    /// A non-handshake message arrived before the handshake.
    #[error("a handshake must be sent before any other message")]
    HandshakeRequired,

    /// A second handshake arrived after one was accepted.
    #[error("handshake already completed for this session")]
    AlreadyHandshaken,

    /// The client speaks a schema the server cannot produce.
    #[error("client schema version {requested} is newer than server maximum {max}; client must downgrade")]
    SchemaVersionTooNew { requested: u32, max: u32 },

    /// The client sent a variant only the server may send.
    #[error("{kind:?} messages are not accepted from clients")]
    ServerOnlyMessage { kind: MessageKind },
}

impl ProtocolViolation {
    /// Returns the error class reported to the client.
    pub fn class(&self) -> ErrorClass {
        match self {
            ProtocolViolation::HandshakeRequired
            | ProtocolViolation::AlreadyHandshaken
            | ProtocolViolation::SchemaVersionTooNew { .. } => ErrorClass::Init,
            ProtocolViolation::ReservedId
            | ProtocolViolation::PingTimedOut
            | ProtocolViolation::ServerOnlyMessage { .. } => ErrorClass::Message,
        }
    }

    /// Converts the violation into an `Error` message keyed to `id`.
    pub fn to_error_message(&self, id: u32) -> Message {
        Message::error(id, self.class(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_violations_are_init_errors() {
        assert_eq!(ProtocolViolation::HandshakeRequired.class(), ErrorClass::Init);
        assert_eq!(ProtocolViolation::AlreadyHandshaken.class(), ErrorClass::Init);
        assert_eq!(
            ProtocolViolation::SchemaVersionTooNew { requested: 3, max: 1 }.class(),
            ErrorClass::Init
        );
    }

    #[test]
    fn test_request_violations_are_msg_errors() {
        assert_eq!(ProtocolViolation::ReservedId.class(), ErrorClass::Message);
        assert_eq!(ProtocolViolation::PingTimedOut.class(), ErrorClass::Message);
    }

    #[test]
    fn test_error_message_keeps_id_and_text() {
        let msg = ProtocolViolation::SchemaVersionTooNew { requested: 3, max: 1 }.to_error_message(1);
        match msg {
            Message::Error(err) => {
                assert_eq!(err.id, 1);
                assert_eq!(err.class, ErrorClass::Init);
                assert!(err.text.contains("newer than server maximum 1"), "{}", err.text);
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
