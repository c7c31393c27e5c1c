//! Seam to the device-command subsystem.
//!
//! The session layer never interprets device requests.  Anything that is not
//! a handshake, ping, echo, or log-control message is handed to a
//! [`DeviceHandler`] unchanged, and whatever it returns (including `Error`
//! messages) becomes the response.
//!
//! Infrastructure implementations drive real hardware or, in this workspace,
//! an in-memory registry; test implementations record calls.

use async_trait::async_trait;
use intercom_core::Message;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceHandler: Send + Sync {
    /// Handles one device request and returns its response.
    async fn handle_message(&self, message: Message) -> Message;

    /// Halts every device.  Called on ping timeout and on shutdown.
    async fn stop_all_devices(&self);
}
