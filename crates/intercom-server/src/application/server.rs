//! Per-connection protocol server.
//!
//! A [`ProtocolServer`] is created by the transport for every connection and
//! owns everything that session needs:
//!
//! ```text
//!   inbound ──► gate::check ──► dispatch ──► OutgoingChannel::normalize ──► response
//!                                  │
//!                                  └─► DeviceHandler (device requests)
//!
//!   LogRelay / PingTimer / notify ──► OutgoingChannel::publish ──► listeners
//! ```
//!
//! The transport awaits [`ProtocolServer::handle`] for one message before
//! passing the next, and forwards everything received from
//! [`ProtocolServer::subscribe_outgoing`] to the client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use intercom_core::protocol::messages::{Echo, Handshake, LogControl, ServerInfo};
use intercom_core::{Message, ProtocolViolation, SessionState};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::device::DeviceHandler;
use crate::application::gate;
use crate::application::log_relay::{LogRelay, LogSink};
use crate::application::outgoing::OutgoingChannel;
use crate::application::ping_timer::PingTimer;
use crate::domain::ServerConfig;

pub struct ProtocolServer {
    config: ServerConfig,
    session: Arc<SessionState>,
    outgoing: Arc<OutgoingChannel>,
    log_relay: LogRelay,
    ping_timer: PingTimer,
    devices: Arc<dyn DeviceHandler>,
    shut_down: AtomicBool,
}

impl ProtocolServer {
    pub fn new(
        config: ServerConfig,
        devices: Arc<dyn DeviceHandler>,
        log_sink: Arc<dyn LogSink>,
    ) -> Self {
        let session = Arc::new(SessionState::new());
        let outgoing = Arc::new(OutgoingChannel::new(Arc::clone(&session)));
        let log_relay = LogRelay::new(Arc::clone(&session), Arc::clone(&outgoing), log_sink);
        let ping_timer = PingTimer::new(config.max_ping_interval);
        Self {
            config,
            session,
            outgoing,
            log_relay,
            ping_timer,
            devices,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Registers a listener for unsolicited server messages (logs, pings,
    /// device notifications).
    pub fn subscribe_outgoing(&self) -> mpsc::UnboundedReceiver<Message> {
        self.outgoing.subscribe()
    }

    /// Publishes an unsolicited message, such as a device event, to the client.
    pub fn notify(&self, message: Message) {
        self.outgoing.publish(message);
    }

    /// Processes one inbound message and returns the response for the client.
    ///
    /// Never fails: every rejection is an `Error` message.
    pub async fn handle(&self, message: Message) -> Message {
        let id = message.id();
        let kind = message.kind();
        debug!(?kind, id, "inbound message");

        let response = match gate::check(&self.session, &message) {
            Ok(()) => self.dispatch(message).await,
            Err(violation) => {
                debug!(?kind, id, %violation, "message rejected by session gate");
                violation.to_error_message(id)
            }
        };
        self.outgoing.normalize(response)
    }

    async fn dispatch(&self, message: Message) -> Message {
        match message {
            Message::Handshake(handshake) => self.handshake(handshake),
            Message::Ping { id } => {
                self.ping_timer.ping();
                Message::Ok { id }
            }
            Message::LogControl(LogControl { id, level }) => {
                self.log_relay.set_level(level);
                debug!(%level, "client log level changed");
                Message::Ok { id }
            }
            Message::Echo(Echo { id, payload }) => Message::Echo(Echo { id, payload }),
            request @ (Message::RequestDeviceList { .. }
            | Message::StopAllDevices { .. }
            | Message::DeviceCommand(_)) => self.devices.handle_message(request).await,
            server_only @ (Message::ServerInfo(_)
            | Message::Ok { .. }
            | Message::Log(_)
            | Message::Error(_)
            | Message::DeviceList(_)
            | Message::DeviceAdded(_)
            | Message::DeviceRemoved { .. }) => ProtocolViolation::ServerOnlyMessage {
                kind: server_only.kind(),
            }
            .to_error_message(server_only.id()),
        }
    }

    fn handshake(&self, handshake: Handshake) -> Message {
        let Handshake {
            id,
            client_name,
            schema_version,
        } = handshake;

        if self.session.is_handshake_complete() {
            return ProtocolViolation::AlreadyHandshaken.to_error_message(id);
        }
        if schema_version > self.config.max_schema_version {
            warn!(
                client = %client_name,
                requested = schema_version,
                max = self.config.max_schema_version,
                "client schema version too new"
            );
            return ProtocolViolation::SchemaVersionTooNew {
                requested: schema_version,
                max: self.config.max_schema_version,
            }
            .to_error_message(id);
        }
        if let Err(violation) = self.session.complete_handshake(&client_name, schema_version) {
            return violation.to_error_message(id);
        }

        info!(client = %client_name, schema_version, "client handshake complete");
        self.ping_timer.start(
            Arc::clone(&self.session),
            Arc::clone(&self.outgoing),
            Arc::clone(&self.devices),
        );

        Message::ServerInfo(ServerInfo {
            id,
            server_name: self.config.server_name.clone(),
            max_ping_interval: self.config.max_ping_interval_ms(),
            max_schema_version: self.config.max_schema_version,
        })
    }

    /// Tears the session down.  Safe to call more than once; only the first
    /// call has any effect.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.ping_timer.stop();
        self.log_relay.unsubscribe();
        self.devices.stop_all_devices().await;
        debug!(client = ?self.session.client_name(), "session shut down");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
