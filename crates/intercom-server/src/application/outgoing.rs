//! Outgoing channel: the single funnel for server-to-client messages.
//!
//! Every message the client will see passes through [`OutgoingChannel::normalize`]:
//!
//! ```text
//! Error message?        ──► unchanged
//! no negotiated version ──► ERROR_MSG "client schema version unknown ..."
//! otherwise             ──► downgrade to the client's version
//!                           (failure ──► ERROR_MSG, also logged locally)
//! ```
//!
//! [`OutgoingChannel::publish`] normalises and then fans the result out to
//! every listener the transport registered with [`OutgoingChannel::subscribe`].
//! Listeners are plain `mpsc` receivers: dropping one stops delivery to it,
//! and its sender is pruned on the next publish.
//!
//! # Ordering
//!
//! The listener list is locked for the whole fan-out, so messages reach each
//! listener in publish order even when publishers run on different threads
//! (log records arrive from wherever they were emitted).

use std::sync::{Arc, Mutex};

use intercom_core::{negotiate, DowngradeError, ErrorClass, Message, SessionState};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::application::lock;

pub struct OutgoingChannel {
    session: Arc<SessionState>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<Message>>>,
}

impl OutgoingChannel {
    pub fn new(session: Arc<SessionState>) -> Self {
        Self {
            session,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new listener and returns its receiving end.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.listeners).push(tx);
        rx
    }

    /// Number of listeners still registered.  Closed ones are counted until
    /// the next publish prunes them.
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Brings `message` into the form the client may receive.
    pub fn normalize(&self, message: Message) -> Message {
        // Errors are never re-downgraded or re-wrapped.
        if message.is_error() {
            return message;
        }

        let id = message.id();
        let kind = message.kind();
        match negotiate(message, self.session.client_schema_version()) {
            Ok(normalized) => normalized,
            Err(err @ DowngradeError::Unnegotiated) => {
                debug!(?kind, id, "outgoing message before handshake");
                Message::error(id, ErrorClass::Message, err.to_string())
            }
            Err(err) => {
                error!(?kind, id, %err, "outgoing message could not be downgraded");
                Message::error(id, ErrorClass::Message, err.to_string())
            }
        }
    }

    /// Normalises `message` and delivers it to every listener in publish order.
    pub fn publish(&self, message: Message) {
        let message = self.normalize(message);
        let mut listeners = lock(&self.listeners);
        listeners.retain(|tx| tx.send(message.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intercom_core::protocol::messages::{DeviceFeature, DeviceInfo, DeviceInfoV3, Echo};

    fn negotiated(version: u32) -> Arc<SessionState> {
        let session = Arc::new(SessionState::new());
        session.complete_handshake("test", version).unwrap();
        session
    }

    fn device_added() -> Message {
        Message::DeviceAdded(DeviceInfo::V3(DeviceInfoV3 {
            device_index: 2,
            device_name: "Wand".to_string(),
            display_name: None,
            features: vec![DeviceFeature {
                command: "Vibrate".to_string(),
                step_count: 20,
            }],
        }))
    }

    #[test]
    fn test_error_passes_through_unchanged_even_before_handshake() {
        let channel = OutgoingChannel::new(Arc::new(SessionState::new()));
        let err = Message::error(4, ErrorClass::Device, "stuck motor");
        assert_eq!(channel.normalize(err.clone()), err);
    }

    #[test]
    fn test_unnegotiated_session_substitutes_local_error() {
        let channel = OutgoingChannel::new(Arc::new(SessionState::new()));

        let out = channel.normalize(Message::Ok { id: 9 });

        match out {
            Message::Error(err) => {
                assert_eq!(err.id, 9);
                assert_eq!(err.class, ErrorClass::Message);
                assert!(err.text.contains("handshake"), "{}", err.text);
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_versioned_message_is_downgraded_to_client_version() {
        let channel = OutgoingChannel::new(negotiated(1));
        assert_eq!(channel.normalize(device_added()).schema_version(), 1);
    }

    #[test]
    fn test_failed_downgrade_becomes_msg_error() {
        let channel = OutgoingChannel::new(negotiated(0));
        let out = channel.normalize(device_added());
        assert!(matches!(
            out,
            Message::Error(ref e) if e.class == ErrorClass::Message && e.id == 0
        ));
    }

    #[tokio::test]
    async fn test_publish_delivers_to_all_listeners_in_order() {
        // Arrange
        let channel = OutgoingChannel::new(negotiated(3));
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        // Act
        for id in 1..=3 {
            channel.publish(Message::Echo(Echo {
                id,
                payload: format!("m{id}"),
            }));
        }

        // Assert
        for rx in [&mut first, &mut second] {
            for id in 1..=3 {
                assert_eq!(rx.recv().await.map(|m| m.id()), Some(id));
            }
        }
    }

    #[test]
    fn test_dropped_listener_is_pruned_on_publish() {
        let channel = OutgoingChannel::new(negotiated(3));
        let kept = channel.subscribe();
        drop(channel.subscribe());
        assert_eq!(channel.listener_count(), 2);

        channel.publish(Message::Ok { id: 1 });

        assert_eq!(channel.listener_count(), 1);
        drop(kept);
    }
}
