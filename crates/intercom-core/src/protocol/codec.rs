//! JSON text codec for Intercom protocol messages.
//!
//! Wire format: one JSON object per transport frame, discriminated by a
//! `"type"` field:
//!
//! ```text
//! {"type":"Echo","id":5,"payload":"x"}
//! ```
//!
//! The session layer never looks at bytes; this codec is only used at the
//! transport edge.

use thiserror::Error;

use crate::protocol::messages::Message;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame was empty or contained only whitespace.
    #[error("empty frame")]
    EmptyFrame,

    /// The frame is not a JSON object describing a known message.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encodes a [`Message`] into a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use intercom_core::protocol::{decode_message, encode_message};
/// use intercom_core::protocol::messages::Message;
///
/// let msg = Message::Ping { id: 42 };
/// let text = encode_message(&msg).unwrap();
/// assert_eq!(decode_message(&text).unwrap(), msg);
/// ```
pub fn encode_message(msg: &Message) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decodes one [`Message`] from a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError`] if the frame is empty or malformed.
pub fn decode_message(text: &str) -> Result<Message, CodecError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CodecError::EmptyFrame);
    }
    Ok(serde_json::from_str(trimmed)?)
}
