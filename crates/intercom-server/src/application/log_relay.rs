//! Log relay: forwards server log records to the client as `Log` messages.
//!
//! The relay only depends on the [`LogSink`] capability, which the server
//! receives at construction.  The process-global sink lives in the
//! infrastructure layer (`infrastructure::log_hub`); tests pass a fake.
//!
//! While the session's outgoing level is `Off` the relay holds no
//! subscription at all, so idle sessions cost the log path nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use intercom_core::protocol::messages::LogEntry;
use intercom_core::{LogLevel, Message, SessionState};

use crate::application::lock;
use crate::application::outgoing::OutgoingChannel;

/// One server log record as seen by listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    /// Module path of the emitting code.
    pub target: String,
    pub text: String,
}

/// Receives every record emitted while subscribed.
///
/// Called synchronously on the emitting thread.  Implementations must not
/// block.
pub trait LogListener: Send + Sync {
    fn on_log(&self, record: &LogRecord);
}

/// Handle returned by [`LogSink::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    /// Allocates the next id from `counter`.
    pub fn next(counter: &AtomicU64) -> Self {
        SubscriptionId(counter.fetch_add(1, Ordering::Relaxed))
    }
}

/// A source of server log records that listeners can attach to.
pub trait LogSink: Send + Sync {
    fn subscribe(&self, listener: Arc<dyn LogListener>) -> SubscriptionId;

    /// Detaches a listener.  Returns `false` if `id` was not subscribed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

struct RelayListener {
    session: Arc<SessionState>,
    outgoing: Arc<OutgoingChannel>,
}

impl LogListener for RelayListener {
    fn on_log(&self, record: &LogRecord) {
        if !self.session.outgoing_log_level().admits(record.level) {
            return;
        }
        self.outgoing.publish(Message::Log(LogEntry {
            level: record.level,
            text: format!("{}: {}", record.target, record.text),
        }));
    }
}

/// Per-session bridge between a [`LogSink`] and the session's outgoing channel.
pub struct LogRelay {
    session: Arc<SessionState>,
    sink: Arc<dyn LogSink>,
    listener: Arc<RelayListener>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl LogRelay {
    pub fn new(
        session: Arc<SessionState>,
        outgoing: Arc<OutgoingChannel>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let listener = Arc::new(RelayListener {
            session: Arc::clone(&session),
            outgoing,
        });
        Self {
            session,
            sink,
            listener,
            subscription: Mutex::new(None),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.subscription).is_some()
    }

    /// Attaches to the sink.  No-op if already attached.
    pub fn subscribe(&self) {
        let mut subscription = lock(&self.subscription);
        if subscription.is_none() {
            let listener: Arc<dyn LogListener> = self.listener.clone();
            *subscription = Some(self.sink.subscribe(listener));
        }
    }

    /// Detaches from the sink.  No-op if not attached.
    pub fn unsubscribe(&self) {
        if let Some(id) = lock(&self.subscription).take() {
            self.sink.unsubscribe(id);
        }
    }

    /// Applies a client `LogControl` request.
    ///
    /// Moving to `Off` detaches from the sink; moving away from `Off` attaches.
    /// Level changes between two non-`Off` levels only update the threshold.
    pub fn set_level(&self, level: LogLevel) {
        let current = self.session.outgoing_log_level();
        if level == LogLevel::Off {
            self.unsubscribe();
        } else if current == LogLevel::Off {
            self.subscribe();
        }
        self.session.swap_outgoing_log_level(level);
    }
}

impl Drop for LogRelay {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
