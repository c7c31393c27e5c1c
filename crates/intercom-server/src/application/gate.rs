//! Session gate: global preconditions checked before any inbound message is
//! dispatched.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. id 0 is reserved for the server,
//! 2. a timed-out session accepts nothing,
//! 3. nothing but a handshake is accepted before the handshake.
//!
//! The gate only reads session state.

use intercom_core::{Message, MessageKind, ProtocolViolation, SessionState, SERVER_MESSAGE_ID};

/// Returns the first precondition `message` violates, if any.
pub fn check(session: &SessionState, message: &Message) -> Result<(), ProtocolViolation> {
    if message.id() == SERVER_MESSAGE_ID {
        return Err(ProtocolViolation::ReservedId);
    }
    if session.is_ping_timed_out() {
        return Err(ProtocolViolation::PingTimedOut);
    }
    if !session.is_handshake_complete() && message.kind() != MessageKind::Handshake {
        return Err(ProtocolViolation::HandshakeRequired);
    }
    Ok(())
}
