//! Integration tests for schema negotiation through the public API.
//!
//! These tests take messages built at the newest layout, bring them down to
//! an older client's schema version, and check what that client would
//! actually see on the wire.

use intercom_core::protocol::messages::{
    DeviceEntries, DeviceFeature, DeviceInfo, DeviceInfoV3, DeviceListMessage,
};
use intercom_core::{
    decode_message, downgrade, encode_message, negotiate, DowngradeError, Message,
    CURRENT_SCHEMA_VERSION,
};

fn device(index: u32, name: &str, features: &[(&str, u32)]) -> DeviceInfoV3 {
    DeviceInfoV3 {
        device_index: index,
        device_name: name.to_string(),
        display_name: None,
        features: features
            .iter()
            .map(|(command, steps)| DeviceFeature {
                command: command.to_string(),
                step_count: *steps,
            })
            .collect(),
    }
}

fn device_list() -> Message {
    Message::DeviceList(DeviceListMessage {
        id: 11,
        devices: DeviceEntries::V3(vec![
            device(0, "Wand", &[("Vibrate", 20)]),
            device(1, "Stroker", &[("Linear", 100), ("Rotate", 10)]),
        ]),
    })
}

#[test]
fn test_v1_client_sees_command_name_lists() {
    let msg = downgrade(device_list(), 1).expect("v3 -> v1 chain exists");

    let json: serde_json::Value =
        serde_json::from_str(&encode_message(&msg).unwrap()).unwrap();

    assert_eq!(json["type"], "DeviceList");
    assert_eq!(json["id"], 11);
    assert_eq!(json["devices"][1]["commands"], serde_json::json!(["Linear", "Rotate"]));
}

#[test]
fn test_v2_client_sees_attribute_maps() {
    let msg = downgrade(device_list(), 2).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&encode_message(&msg).unwrap()).unwrap();

    assert_eq!(json["devices"][0]["commands"]["Vibrate"]["feature_count"], 1);
    assert_eq!(json["devices"][0]["commands"]["Vibrate"]["step_count"], serde_json::json!([20]));
}

#[test]
fn test_current_client_sees_features_unchanged() {
    let original = device_list();
    let msg = negotiate(original.clone(), Some(CURRENT_SCHEMA_VERSION)).unwrap();
    assert_eq!(msg, original);
}

#[test]
fn test_downgraded_layouts_decode_back_into_their_versions() {
    for target in 1..=CURRENT_SCHEMA_VERSION {
        let msg = downgrade(device_list(), target).unwrap();
        let decoded = decode_message(&encode_message(&msg).unwrap()).unwrap();
        assert_eq!(decoded.schema_version(), target);
    }
}

#[test]
fn test_empty_device_lists_keep_their_version_on_the_wire() {
    let empty = Message::DeviceList(DeviceListMessage {
        id: 3,
        devices: DeviceEntries::V3(Vec::new()),
    });
    for target in 1..=CURRENT_SCHEMA_VERSION {
        // Arrange
        let msg = downgrade(empty.clone(), target).unwrap();

        // Act
        let text = encode_message(&msg).unwrap();
        let decoded = decode_message(&text).unwrap();

        // Assert
        assert_eq!(decoded, msg, "wire text {text}");
        assert_eq!(decoded.schema_version(), target);
    }
}

#[test]
fn test_device_list_wire_carries_schema_version() {
    let msg = downgrade(device_list(), 2).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&encode_message(&msg).unwrap()).unwrap();
    assert_eq!(json["schema_version"], 2);
}

#[test]
fn test_device_added_cannot_reach_unversioned_client() {
    let added = Message::DeviceAdded(DeviceInfo::V3(device(3, "Plug", &[("Vibrate", 5)])));
    assert!(matches!(
        downgrade(added, 0),
        Err(DowngradeError::MissingStep { version: 1, .. })
    ));
}
