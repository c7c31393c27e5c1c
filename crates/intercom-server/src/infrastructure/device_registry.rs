//! In-memory device registry.
//!
//! [`DeviceRegistry`] is the [`DeviceHandler`] the binary runs with: a fixed
//! list of devices (seeded from the config file) and the last step written to
//! each feature.  It drives no hardware.
//!
//! # Commands
//!
//! A `DeviceCommand` is accepted when the device index exists, the feature
//! index exists on that device, the command name matches the feature, and
//! `step <= step_count`.  Step 0 releases the feature.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use intercom_core::protocol::messages::{
    DeviceCommand, DeviceEntries, DeviceInfoV3, DeviceListMessage,
};
use intercom_core::{ErrorClass, Message};
use thiserror::Error;
use tracing::{debug, info};

use crate::application::DeviceHandler;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no device with index {0}")]
    UnknownDevice(u32),

    #[error("device {device_index} has no feature {feature_index}")]
    UnknownFeature {
        device_index: u32,
        feature_index: u32,
    },

    #[error("feature {feature_index} of device {device_index} does not accept {command:?}")]
    WrongCommand {
        device_index: u32,
        feature_index: u32,
        command: String,
    },

    #[error("step {step} out of range, feature supports 0..={step_count}")]
    StepOutOfRange { step: u32, step_count: u32 },
}

pub struct DeviceRegistry {
    devices: Vec<DeviceInfoV3>,
    /// `(device_index, feature_index)` to the last non-zero step.
    active: Mutex<HashMap<(u32, u32), u32>>,
}

impl DeviceRegistry {
    pub fn new(devices: Vec<DeviceInfoV3>) -> Self {
        Self {
            devices,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn devices(&self) -> &[DeviceInfoV3] {
        &self.devices
    }

    /// Number of features currently driven at a non-zero step.
    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn device(&self, index: u32) -> Option<&DeviceInfoV3> {
        self.devices.iter().find(|d| d.device_index == index)
    }

    /// Validates `cmd` and records its step.
    pub fn apply(&self, cmd: &DeviceCommand) -> Result<(), DeviceError> {
        let device = self
            .device(cmd.device_index)
            .ok_or(DeviceError::UnknownDevice(cmd.device_index))?;
        let feature = device
            .features
            .get(cmd.feature_index as usize)
            .ok_or(DeviceError::UnknownFeature {
                device_index: cmd.device_index,
                feature_index: cmd.feature_index,
            })?;
        if feature.command != cmd.command {
            return Err(DeviceError::WrongCommand {
                device_index: cmd.device_index,
                feature_index: cmd.feature_index,
                command: cmd.command.clone(),
            });
        }
        if cmd.step > feature.step_count {
            return Err(DeviceError::StepOutOfRange {
                step: cmd.step,
                step_count: feature.step_count,
            });
        }

        let key = (cmd.device_index, cmd.feature_index);
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if cmd.step == 0 {
            active.remove(&key);
        } else {
            active.insert(key, cmd.step);
        }
        debug!(
            device = %device.device_name,
            feature = cmd.feature_index,
            step = cmd.step,
            "device command applied"
        );
        Ok(())
    }

    fn clear(&self) -> usize {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let stopped = active.len();
        active.clear();
        stopped
    }
}

#[async_trait]
impl DeviceHandler for DeviceRegistry {
    async fn handle_message(&self, message: Message) -> Message {
        match message {
            Message::RequestDeviceList { id } => Message::DeviceList(DeviceListMessage {
                id,
                devices: DeviceEntries::V3(self.devices.clone()),
            }),
            Message::StopAllDevices { id } => {
                self.stop_all_devices().await;
                Message::Ok { id }
            }
            Message::DeviceCommand(cmd) => match self.apply(&cmd) {
                Ok(()) => Message::Ok { id: cmd.id },
                Err(err) => Message::error(cmd.id, ErrorClass::Device, err.to_string()),
            },
            other => Message::error(
                other.id(),
                ErrorClass::Message,
                format!("{:?} is not a device request", other.kind()),
            ),
        }
    }

    async fn stop_all_devices(&self) {
        let stopped = self.clear();
        info!(stopped, "all devices stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intercom_core::protocol::messages::DeviceFeature;

    fn registry() -> DeviceRegistry {
        DeviceRegistry::new(vec![DeviceInfoV3 {
            device_index: 0,
            device_name: "Test Vibrator".to_string(),
            display_name: None,
            features: vec![
                DeviceFeature {
                    command: "Vibrate".to_string(),
                    step_count: 20,
                },
                DeviceFeature {
                    command: "Rotate".to_string(),
                    step_count: 10,
                },
            ],
        }])
    }

    fn command(device_index: u32, feature_index: u32, command: &str, step: u32) -> Message {
        Message::DeviceCommand(DeviceCommand {
            id: 7,
            device_index,
            feature_index,
            command: command.to_string(),
            step,
        })
    }

    fn assert_device_error(msg: Message) {
        assert!(
            matches!(msg, Message::Error(ref e) if e.class == ErrorClass::Device && e.id == 7),
            "{msg:?}"
        );
    }

    #[tokio::test]
    async fn test_device_list_uses_current_layout() {
        let reg = registry();
        match reg.handle_message(Message::RequestDeviceList { id: 3 }).await {
            Message::DeviceList(list) => {
                assert_eq!(list.id, 3);
                assert_eq!(list.devices.len(), 1);
                assert_eq!(list.devices.schema_version(), 3);
            }
            other => panic!("expected DeviceList, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_valid_command_is_ok_and_tracked() {
        let reg = registry();
        let response = reg.handle_message(command(0, 1, "Rotate", 5)).await;
        assert_eq!(response, Message::Ok { id: 7 });
        assert_eq!(reg.active_count(), 1);
    }

    #[tokio::test]
    async fn test_step_zero_releases_feature() {
        let reg = registry();
        let _ = reg.handle_message(command(0, 0, "Vibrate", 10)).await;
        let _ = reg.handle_message(command(0, 0, "Vibrate", 0)).await;
        assert_eq!(reg.active_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_commands_are_device_errors() {
        let reg = registry();
        assert_device_error(reg.handle_message(command(9, 0, "Vibrate", 1)).await);
        assert_device_error(reg.handle_message(command(0, 5, "Vibrate", 1)).await);
        assert_device_error(reg.handle_message(command(0, 0, "Rotate", 1)).await);
        assert_device_error(reg.handle_message(command(0, 0, "Vibrate", 21)).await);
        assert_eq!(reg.active_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_all_devices_clears_active_commands() {
        let reg = registry();
        let _ = reg.handle_message(command(0, 0, "Vibrate", 10)).await;
        let _ = reg.handle_message(command(0, 1, "Rotate", 3)).await;

        let response = reg.handle_message(Message::StopAllDevices { id: 8 }).await;

        assert_eq!(response, Message::Ok { id: 8 });
        assert_eq!(reg.active_count(), 0);
    }

    #[tokio::test]
    async fn test_non_device_message_is_msg_error() {
        let reg = registry();
        let response = reg.handle_message(Message::Ping { id: 4 }).await;
        assert!(matches!(response, Message::Error(ref e) if e.class == ErrorClass::Message));
    }
}
