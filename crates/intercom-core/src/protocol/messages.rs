//! All Intercom protocol message types.
//!
//! Every message carries three things the session layer inspects:
//!
//! - an **id** (`0` is reserved for server-originated, unsolicited messages),
//! - a **type tag** ([`MessageKind`]),
//! - a **schema version** (`0` means the variant has a single layout that is
//!   valid for every client).
//!
//! Only the device-description messages have version-specific layouts.  They
//! are always built at [`CURRENT_SCHEMA_VERSION`] and rewritten toward the
//! client's version by [`crate::protocol::downgrade`] on the way out.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Newest message schema version this build knows how to produce.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Schema version of variants with no version-specific representation.
pub const UNVERSIONED: u32 = 0;

/// Identifier used by every server-originated (unsolicited) message.
pub const SERVER_MESSAGE_ID: u32 = 0;

// ── Log levels ────────────────────────────────────────────────────────────────

/// Verbosity a client can request for relayed server log output.
///
/// Severity grows from `Trace` to `Error`; `Off` disables the relay entirely.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum LogLevel {
    #[default]
    Off = 0,
    Trace = 1,
    Debug = 2,
    Info = 3,
    Warn = 4,
    Error = 5,
}

impl LogLevel {
    /// Canonical level name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "Off",
            LogLevel::Trace => "Trace",
            LogLevel::Debug => "Debug",
            LogLevel::Info => "Info",
            LogLevel::Warn => "Warn",
            LogLevel::Error => "Error",
        }
    }

    /// Returns `true` if a record of severity `record` passes this threshold.
    ///
    /// An `Off` threshold admits nothing.
    pub fn admits(self, record: LogLevel) -> bool {
        self != LogLevel::Off && record != LogLevel::Off && record >= self
    }

    /// Inverse of `level as u8`.
    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(LogLevel::Off),
            1 => Some(LogLevel::Trace),
            2 => Some(LogLevel::Debug),
            3 => Some(LogLevel::Info),
            4 => Some(LogLevel::Warn),
            5 => Some(LogLevel::Error),
            _ => None,
        }
    }
}


impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Error classes ─────────────────────────────────────────────────────────────

/// Error class carried by [`ErrorMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Handshake-ordering violations.
    #[serde(rename = "ERROR_INIT")]
    Init,
    /// Malformed or disallowed requests, ping timeout, failed downgrade.
    #[serde(rename = "ERROR_MSG")]
    Message,
    /// Unsolicited notice that the ping watchdog fired.
    #[serde(rename = "ERROR_PING")]
    Ping,
    /// Failure reported by the device-command subsystem.
    #[serde(rename = "ERROR_DEVICE")]
    Device,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Init => "ERROR_INIT",
            ErrorClass::Message => "ERROR_MSG",
            ErrorClass::Ping => "ERROR_PING",
            ErrorClass::Device => "ERROR_DEVICE",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Message type tags ─────────────────────────────────────────────────────────

/// Type tag discriminating every [`Message`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Handshake,
    ServerInfo,
    Ping,
    Ok,
    LogControl,
    Log,
    Echo,
    Error,
    RequestDeviceList,
    StopAllDevices,
    DeviceCommand,
    DeviceList,
    DeviceAdded,
    DeviceRemoved,
}

// ── Session-layer payloads ────────────────────────────────────────────────────

/// HANDSHAKE: the first message a client sends, announcing name and schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub id: u32,
    /// Human-readable client application name.
    pub client_name: String,
    /// Schema version the client speaks.
    pub schema_version: u32,
}

/// SERVER_INFO: reply to a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: u32,
    pub server_name: String,
    /// Maximum time between client pings in milliseconds; `0` disables the watchdog.
    pub max_ping_interval: u64,
    /// Newest schema version the server accepts.
    pub max_schema_version: u32,
}

/// LOG_CONTROL: client selects the verbosity of relayed server logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogControl {
    pub id: u32,
    pub level: LogLevel,
}

/// LOG: one relayed server log record.  Always carries id 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub text: String,
}

/// ECHO: connectivity check; the server answers with the same payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Echo {
    pub id: u32,
    pub payload: String,
}

/// ERROR: failure report, keyed to the request that caused it (or 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub id: u32,
    pub class: ErrorClass,
    /// Human-readable description, intended for client logs.
    pub text: String,
}

// ── Device-layer payloads ─────────────────────────────────────────────────────

/// DEVICE_COMMAND: opaque actuator request forwarded to the device subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCommand {
    pub id: u32,
    pub device_index: u32,
    pub feature_index: u32,
    /// Command name understood by the device subsystem (e.g. `"Vibrate"`).
    pub command: String,
    /// Target step within the feature's `step_count`.
    pub step: u32,
}

/// A single actuator or sensor exposed by a device (schema v3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFeature {
    pub command: String,
    pub step_count: u32,
}

/// Device description, schema v3: one descriptor per feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfoV3 {
    pub device_index: u32,
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub features: Vec<DeviceFeature>,
}

/// Per-command attributes used by schema v2 device descriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAttributes {
    pub feature_count: u32,
    pub step_count: Vec<u32>,
}

/// Device description, schema v2: features grouped by command name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfoV2 {
    pub device_index: u32,
    pub device_name: String,
    pub commands: BTreeMap<String, CommandAttributes>,
}

/// Device description, schema v1: command names only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfoV1 {
    pub device_index: u32,
    pub device_name: String,
    pub commands: Vec<String>,
}

/// A device description in one of its schema layouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceInfo {
    V3(DeviceInfoV3),
    V2(DeviceInfoV2),
    V1(DeviceInfoV1),
}

impl DeviceInfo {
    pub fn schema_version(&self) -> u32 {
        match self {
            DeviceInfo::V3(_) => 3,
            DeviceInfo::V2(_) => 2,
            DeviceInfo::V1(_) => 1,
        }
    }
}

/// The entries of a device list, all in the same schema layout.
///
/// On its own the layout is only recognisable from a non-empty list;
/// [`DeviceListMessage`] carries the version explicitly on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceEntries {
    V3(Vec<DeviceInfoV3>),
    V2(Vec<DeviceInfoV2>),
    V1(Vec<DeviceInfoV1>),
}

impl DeviceEntries {
    pub fn schema_version(&self) -> u32 {
        match self {
            DeviceEntries::V3(_) => 3,
            DeviceEntries::V2(_) => 2,
            DeviceEntries::V1(_) => 1,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DeviceEntries::V3(d) => d.len(),
            DeviceEntries::V2(d) => d.len(),
            DeviceEntries::V1(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An empty list in the layout of `schema_version`.
    pub fn empty(schema_version: u32) -> Option<Self> {
        match schema_version {
            3 => Some(DeviceEntries::V3(Vec::new())),
            2 => Some(DeviceEntries::V2(Vec::new())),
            1 => Some(DeviceEntries::V1(Vec::new())),
            _ => None,
        }
    }
}

/// DEVICE_LIST: reply to `RequestDeviceList`.
///
/// ```json
/// {"type":"DeviceList","id":2,"schema_version":1,"devices":[]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DeviceListWire", into = "DeviceListWire")]
pub struct DeviceListMessage {
    pub id: u32,
    pub devices: DeviceEntries,
}

#[derive(Serialize, Deserialize)]
struct DeviceListWire {
    id: u32,
    schema_version: u32,
    devices: DeviceEntries,
}

impl From<DeviceListMessage> for DeviceListWire {
    fn from(list: DeviceListMessage) -> Self {
        DeviceListWire {
            id: list.id,
            schema_version: list.devices.schema_version(),
            devices: list.devices,
        }
    }
}

impl TryFrom<DeviceListWire> for DeviceListMessage {
    type Error = String;

    fn try_from(wire: DeviceListWire) -> Result<Self, String> {
        let declared = wire.schema_version;
        let devices = if wire.devices.is_empty() {
            DeviceEntries::empty(declared)
                .ok_or_else(|| format!("unknown device list schema version {declared}"))?
        } else if wire.devices.schema_version() == declared {
            wire.devices
        } else {
            return Err(format!(
                "device list declares schema version {declared} but its entries use version {}",
                wire.devices.schema_version()
            ));
        };
        Ok(DeviceListMessage {
            id: wire.id,
            devices,
        })
    }
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All valid Intercom messages, discriminated by the `"type"` field on the wire.
///
/// ```json
/// {"type":"Handshake","id":1,"client_name":"panel","schema_version":3}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    Handshake(Handshake),
    ServerInfo(ServerInfo),
    Ping { id: u32 },
    Ok { id: u32 },
    LogControl(LogControl),
    Log(LogEntry),
    Echo(Echo),
    Error(ErrorMessage),
    RequestDeviceList { id: u32 },
    StopAllDevices { id: u32 },
    DeviceCommand(DeviceCommand),
    DeviceList(DeviceListMessage),
    DeviceAdded(DeviceInfo),
    DeviceRemoved { device_index: u32 },
}

impl Message {
    /// Builds an [`ErrorMessage`] keyed to `id`.
    pub fn error(id: u32, class: ErrorClass, text: impl Into<String>) -> Self {
        Message::Error(ErrorMessage {
            id,
            class,
            text: text.into(),
        })
    }

    /// Returns the [`MessageKind`] discriminant for this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Handshake(_) => MessageKind::Handshake,
            Message::ServerInfo(_) => MessageKind::ServerInfo,
            Message::Ping { .. } => MessageKind::Ping,
            Message::Ok { .. } => MessageKind::Ok,
            Message::LogControl(_) => MessageKind::LogControl,
            Message::Log(_) => MessageKind::Log,
            Message::Echo(_) => MessageKind::Echo,
            Message::Error(_) => MessageKind::Error,
            Message::RequestDeviceList { .. } => MessageKind::RequestDeviceList,
            Message::StopAllDevices { .. } => MessageKind::StopAllDevices,
            Message::DeviceCommand(_) => MessageKind::DeviceCommand,
            Message::DeviceList(_) => MessageKind::DeviceList,
            Message::DeviceAdded(_) => MessageKind::DeviceAdded,
            Message::DeviceRemoved { .. } => MessageKind::DeviceRemoved,
        }
    }

    /// Returns the message id; unsolicited variants always report 0.
    pub fn id(&self) -> u32 {
        match self {
            Message::Handshake(m) => m.id,
            Message::ServerInfo(m) => m.id,
            Message::Ping { id }
            | Message::Ok { id }
            | Message::RequestDeviceList { id }
            | Message::StopAllDevices { id } => *id,
            Message::LogControl(m) => m.id,
            Message::Echo(m) => m.id,
            Message::Error(m) => m.id,
            Message::DeviceCommand(m) => m.id,
            Message::DeviceList(m) => m.id,
            Message::Log(_) | Message::DeviceAdded(_) | Message::DeviceRemoved { .. } => {
                SERVER_MESSAGE_ID
            }
        }
    }

    /// Returns the schema version of this message's layout.
    pub fn schema_version(&self) -> u32 {
        match self {
            Message::DeviceList(m) => m.devices.schema_version(),
            Message::DeviceAdded(info) => info.schema_version(),
            _ => UNVERSIONED,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Message::Error(_))
    }
}
