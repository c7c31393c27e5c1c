//! Process-wide log hub.
//!
//! [`LogHub`] is the production [`LogSink`]: the binary installs
//! [`LogHubLayer`] into the global `tracing` subscriber, and every event the
//! server's own crates emit is turned into a [`LogRecord`] and handed to each
//! subscribed session's relay.
//!
//! Only targets under [`RELAYED_TARGETS`] are relayed.  Dependencies log
//! while a relayed frame is being written (tungstenite traces every frame it
//! sends), so relaying them would feed each `Log` frame back into the hub.
//! Records bridged from the `log` crate are normalised first, so their real
//! target decides, not `"log"`.
//!
//! Within those targets the layer has no level filter, so clients can ask for
//! more verbose output than the console shows.
//!
//! Relaying a record may itself log (the outgoing channel logs failed
//! downgrades).  Records emitted while the hub is already delivering on the
//! same thread are dropped to keep that from recursing.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, PoisonError, RwLock};

use intercom_core::LogLevel;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_log::NormalizeEvent;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::{Context, Layer};

use crate::application::log_relay::{LogListener, LogRecord, LogSink, SubscriptionId};

/// Target prefixes whose events reach clients.
pub const RELAYED_TARGETS: &[&str] = &["intercom_core", "intercom_server"];

thread_local! {
    static DELIVERING: Cell<bool> = const { Cell::new(false) };
}

/// Marks this thread as delivering until dropped, unwinding included.
struct DeliveryGuard;

impl DeliveryGuard {
    /// `None` if this thread is already delivering.
    fn enter() -> Option<Self> {
        DELIVERING.with(|d| (!d.replace(true)).then_some(DeliveryGuard))
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(false));
    }
}

type Listeners = Vec<(SubscriptionId, Arc<dyn LogListener>)>;

#[derive(Default)]
pub struct LogHub {
    next_id: AtomicU64,
    listeners: RwLock<Listeners>,
}

impl LogHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a layer feeding this hub, for `tracing_subscriber::registry().with(..)`.
    pub fn layer(self: &Arc<Self>) -> LogHubLayer {
        let targets = Targets::new().with_targets(
            RELAYED_TARGETS
                .iter()
                .map(|target| (*target, LevelFilter::TRACE)),
        );
        LogHubLayer {
            hub: Arc::clone(self),
            targets,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `record` to every current listener.
    pub fn emit(&self, record: &LogRecord) {
        let Some(_guard) = DeliveryGuard::enter() else {
            return;
        };

        // Snapshot so listeners run without the lock held; a listener may
        // unsubscribe itself.
        let listeners: Vec<Arc<dyn LogListener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            listener.on_log(record);
        }
    }
}

impl LogSink for LogHub {
    fn subscribe(&self, listener: Arc<dyn LogListener>) -> SubscriptionId {
        let id = SubscriptionId::next(&self.next_id);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }
}

/// `tracing_subscriber` layer that forwards the server's events to a [`LogHub`].
#[derive(Clone)]
pub struct LogHubLayer {
    hub: Arc<LogHub>,
    targets: Targets,
}

impl<S: Subscriber> Layer<S> for LogHubLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if self.hub.listener_count() == 0 {
            return;
        }
        let normalized = event.normalized_metadata();
        let metadata = normalized.as_ref().unwrap_or_else(|| event.metadata());
        if !self.targets.would_enable(metadata.target(), metadata.level()) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let record = LogRecord {
            level: level_of(metadata.level()),
            target: metadata.target().to_string(),
            text: visitor.into_text(),
        };
        self.hub.emit(&record);
    }
}

pub fn level_of(level: &Level) -> LogLevel {
    match *level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        Level::ERROR => LogLevel::Error,
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl FieldVisitor {
    fn record(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            // `log.target`, `log.file`, ... already folded into the metadata.
            name if name.starts_with("log.") => {}
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }

    /// `message key=value key=value`, fields in name order.
    fn into_text(self) -> String {
        let mut text = self.message.unwrap_or_default();
        for (key, value) in self.fields {
            if !text.is_empty() {
                text.push(' ');
            }
            let _ = write!(text, "{key}={value}");
        }
        text
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record(field, value.to_string());
    }
}
