//! Schema-version downgrade of outgoing messages.
//!
//! # How downgrading works (for beginners)
//!
//! A client declares the schema version it speaks during the handshake.  The
//! server always builds messages at its newest layout, so before anything is
//! delivered it must be rewritten into the layout the client understands.
//!
//! Each rewrite is one *step*: a pure function that turns a message at
//! version `N` into the equivalent message at some version below `N`.  The
//! steps live in a single static table, [`DOWNGRADE_TABLE`], keyed by
//! `(MessageKind, from_version)`.  Keeping them in one table instead of spread
//! over trait impls makes every chain auditable at a glance:
//!
//! ```text
//! DeviceAdded  v3 ──► v2 ──► v1 ──► (terminal)
//! DeviceList   v3 ──► v2 ──► v1 ──► (terminal)
//! everything else: v0 (valid for every client, never rewritten)
//! ```
//!
//! [`downgrade`] applies steps until the message reaches the target version or
//! version 0.  A missing step or a step that fails to lower the version is
//! reported as a [`DowngradeError`] instead of looping forever.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::trace;

use crate::protocol::messages::{
    CommandAttributes, DeviceEntries, DeviceInfo, DeviceInfoV1, DeviceInfoV2, DeviceInfoV3,
    DeviceListMessage, Message, MessageKind, UNVERSIONED,
};

/// Errors produced while bringing a message down to the client's version.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DowngradeError {
    /// The session never completed a handshake, so there is no target version.
    #[error("client schema version unknown, was the handshake sent?")]
    Unnegotiated,

    /// The table holds no step for this kind at this version.
    #[error("{kind:?} has no representation below schema version {version} (client wants {target})")]
    MissingStep {
        kind: MessageKind,
        version: u32,
        target: u32,
    },

    /// A step returned a message whose version did not strictly decrease.
    #[error("downgrade step for {kind:?} v{from} produced v{to}")]
    NotDecreasing { kind: MessageKind, from: u32, to: u32 },
}

/// A pure transformation from one schema layout to an older one.
pub type DowngradeFn = fn(Message) -> Message;

/// One entry of the downgrade table.
#[derive(Debug, Clone, Copy)]
pub struct DowngradeStep {
    pub kind: MessageKind,
    pub from_version: u32,
    pub apply: DowngradeFn,
}

/// Every downgrade step known to the protocol.
pub const DOWNGRADE_TABLE: &[DowngradeStep] = &[
    DowngradeStep {
        kind: MessageKind::DeviceAdded,
        from_version: 3,
        apply: device_added_v3_to_v2,
    },
    DowngradeStep {
        kind: MessageKind::DeviceAdded,
        from_version: 2,
        apply: device_added_v2_to_v1,
    },
    DowngradeStep {
        kind: MessageKind::DeviceList,
        from_version: 3,
        apply: device_list_v3_to_v2,
    },
    DowngradeStep {
        kind: MessageKind::DeviceList,
        from_version: 2,
        apply: device_list_v2_to_v1,
    },
];

/// Looks up the step that lowers `kind` from `version`.
pub fn find_step(kind: MessageKind, version: u32) -> Option<&'static DowngradeStep> {
    DOWNGRADE_TABLE
        .iter()
        .find(|step| step.kind == kind && step.from_version == version)
}

/// Rewrites `message` until its schema version equals `target` or reaches 0.
///
/// # Errors
///
/// Returns [`DowngradeError::MissingStep`] when the chain ends before the
/// target is reached, and [`DowngradeError::NotDecreasing`] if a step does
/// not lower the version.
///
/// # Examples
///
/// ```rust
/// use intercom_core::protocol::downgrade::downgrade;
/// use intercom_core::protocol::messages::Message;
///
/// let ping = Message::Ping { id: 3 };
/// assert_eq!(downgrade(ping.clone(), 1).unwrap(), ping);
/// ```
pub fn downgrade(mut message: Message, target: u32) -> Result<Message, DowngradeError> {
    loop {
        let version = message.schema_version();
        if version == target || version == UNVERSIONED {
            return Ok(message);
        }

        let kind = message.kind();
        let step = find_step(kind, version).ok_or(DowngradeError::MissingStep {
            kind,
            version,
            target,
        })?;

        message = (step.apply)(message);
        let next = message.schema_version();
        if next >= version {
            return Err(DowngradeError::NotDecreasing {
                kind,
                from: version,
                to: next,
            });
        }
        trace!(?kind, from = version, to = next, "downgraded message");
    }
}

/// Downgrades toward the session's negotiated version, refusing if there is none.
pub fn negotiate(message: Message, client_version: Option<u32>) -> Result<Message, DowngradeError> {
    match client_version {
        Some(target) => downgrade(message, target),
        None => Err(DowngradeError::Unnegotiated),
    }
}

// ── Layout conversions ────────────────────────────────────────────────────────

impl From<DeviceInfoV3> for DeviceInfoV2 {
    fn from(info: DeviceInfoV3) -> Self {
        let mut commands: BTreeMap<String, CommandAttributes> = BTreeMap::new();
        for feature in info.features {
            let attrs = commands.entry(feature.command).or_default();
            attrs.feature_count += 1;
            attrs.step_count.push(feature.step_count);
        }
        DeviceInfoV2 {
            device_index: info.device_index,
            device_name: info.device_name,
            commands,
        }
    }
}

impl From<DeviceInfoV2> for DeviceInfoV1 {
    fn from(info: DeviceInfoV2) -> Self {
        DeviceInfoV1 {
            device_index: info.device_index,
            device_name: info.device_name,
            commands: info.commands.into_keys().collect(),
        }
    }
}

// ── Table steps ───────────────────────────────────────────────────────────────
//
// A step handed a message it does not recognise returns it untouched; the
// loop in `downgrade` then reports `NotDecreasing`.

fn device_added_v3_to_v2(message: Message) -> Message {
    match message {
        Message::DeviceAdded(DeviceInfo::V3(info)) => Message::DeviceAdded(DeviceInfo::V2(info.into())),
        other => other,
    }
}

fn device_added_v2_to_v1(message: Message) -> Message {
    match message {
        Message::DeviceAdded(DeviceInfo::V2(info)) => Message::DeviceAdded(DeviceInfo::V1(info.into())),
        other => other,
    }
}

fn device_list_v3_to_v2(message: Message) -> Message {
    match message {
        Message::DeviceList(DeviceListMessage {
            id,
            devices: DeviceEntries::V3(devices),
        }) => Message::DeviceList(DeviceListMessage {
            id,
            devices: DeviceEntries::V2(devices.into_iter().map(Into::into).collect()),
        }),
        other => other,
    }
}

fn device_list_v2_to_v1(message: Message) -> Message {
    match message {
        Message::DeviceList(DeviceListMessage {
            id,
            devices: DeviceEntries::V2(devices),
        }) => Message::DeviceList(DeviceListMessage {
            id,
            devices: DeviceEntries::V1(devices.into_iter().map(Into::into).collect()),
        }),
        other => other,
    }
}
