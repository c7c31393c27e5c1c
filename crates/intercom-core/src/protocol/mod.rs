//! Protocol module containing message types, the schema downgrade table, and the codec.

pub mod codec;
pub mod downgrade;
pub mod messages;

pub use codec::{decode_message, encode_message, CodecError};
pub use downgrade::{downgrade, negotiate, DowngradeError};
pub use messages::*;
