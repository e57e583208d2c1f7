//! Message payload types.
//!
//! Field names follow the wire format exactly (`uniqueHardwareId`, `temp_humi`).
//! Keys the backend adds that are not modelled here are kept in
//! [`Payload::extra`] so they survive a decode/encode cycle.
//!
//! Decoding never rejects a payload object. A known key whose value does not
//! fit its type is moved to [`Payload::extra`] unchanged, so the frame is
//! still routed by its `type`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Payload
// ============================================================================

/// Optional body of a [`Message`](super::Message).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Payload {
    /// Device the message refers to.
    #[serde(rename = "uniqueHardwareId", skip_serializing_if = "Option::is_none")]
    pub unique_hardware_id: Option<String>,

    /// Bearer credential (only in `user_auth`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Reported device state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<EndpointState>,

    /// Command addressed to a device.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<DeviceCommand>,

    /// Sensor readings pushed alongside an endpoint state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor: Option<SensorData>,

    /// Any other keys present on the wire, and known keys whose value did
    /// not decode.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

impl Payload {
    /// Creates a payload addressed to one device.
    #[inline]
    #[must_use]
    pub fn for_device(unique_hardware_id: impl Into<String>) -> Self {
        Self {
            unique_hardware_id: Some(unique_hardware_id.into()),
            ..Default::default()
        }
    }

    /// Builds a payload from a raw JSON value.
    ///
    /// A non-object value yields an empty payload.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };

        let mut payload = Self::default();
        for (key, value) in map {
            let extra = &mut payload.extra;
            match key.as_str() {
                "uniqueHardwareId" => fill(&mut payload.unique_hardware_id, key, value, extra),
                "token" => fill(&mut payload.token, key, value, extra),
                "state" => fill(&mut payload.state, key, value, extra),
                "command" => fill(&mut payload.command, key, value, extra),
                "sensor" => fill(&mut payload.sensor, key, value, extra),
                _ => {
                    extra.insert(key, value);
                }
            }
        }
        payload
    }
}

/// Decodes `value` into `slot`, or parks it in `extra` under `key`.
fn fill<T: DeserializeOwned>(
    slot: &mut Option<T>,
    key: String,
    value: Value,
    extra: &mut Map<String, Value>,
) {
    if value.is_null() {
        return;
    }
    match T::deserialize(&value) {
        Ok(decoded) => *slot = Some(decoded),
        Err(_) => {
            extra.insert(key, value);
        }
    }
}

/// Reads an optional field, mapping a value of the wrong shape to `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(&value).ok())
}

/// Reads a presence flag sent either as a boolean or as `0`/`1`.
fn presence_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => Some(flag),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        _ => None,
    })
}

// ============================================================================
// EndpointState
// ============================================================================

/// Reported status of one physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    /// Relay on.
    On,
    /// Relay off.
    Off,
    /// Device reported a fault.
    Error,
    /// State not known yet.
    Unknown,
    /// Device connected to the backend.
    Online,
    /// Device disconnected from the backend.
    Offline,
}

impl EndpointState {
    /// Returns the switch position, if this state carries one.
    #[inline]
    #[must_use]
    pub const fn as_switch(&self) -> Option<bool> {
        match self {
            Self::On => Some(true),
            Self::Off => Some(false),
            _ => None,
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Error => "error",
            Self::Unknown => "unknown",
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DeviceCommand
// ============================================================================

/// Command nested inside a `set_endpoint_state` / `user_command` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCommand {
    /// Requested switch position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<bool>,

    /// Free-form command data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Who issued the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<CommandOrigin>,

    /// Command subtype.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl DeviceCommand {
    /// Creates a switch command issued by the user.
    #[inline]
    #[must_use]
    pub fn switch(on: bool) -> Self {
        Self {
            state: Some(on),
            from: Some(CommandOrigin::User),
            ..Default::default()
        }
    }
}

/// Origin tag of a device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOrigin {
    /// Issued from the app.
    User,
    /// Issued by the automation model.
    Ml,
}

// ============================================================================
// SensorData
// ============================================================================

/// Sensor readings attached to an endpoint state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    /// Temperature and humidity.
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub temp_humi: Option<TempHumi>,

    /// Passive infrared presence sensor.
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub pir: Option<PresenceReading>,

    /// Radar presence sensor.
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub radar: Option<PresenceReading>,
}

/// Temperature (°C) and relative humidity (%). Either may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TempHumi {
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub temperature: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub humidity: Option<f64>,
}

/// Presence sensor reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceReading {
    /// `true` while presence is detected.
    #[serde(
        default,
        deserialize_with = "presence_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<bool>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_endpoint_state_wire_names() {
        for (state, name) in [
            (EndpointState::On, "on"),
            (EndpointState::Off, "off"),
            (EndpointState::Error, "error"),
            (EndpointState::Unknown, "unknown"),
            (EndpointState::Online, "online"),
            (EndpointState::Offline, "offline"),
        ] {
            assert_eq!(serde_json::to_value(state).unwrap(), json!(name));
            assert_eq!(state.to_string(), name);
        }
    }

    #[test]
    fn test_as_switch() {
        assert_eq!(EndpointState::On.as_switch(), Some(true));
        assert_eq!(EndpointState::Off.as_switch(), Some(false));
        assert_eq!(EndpointState::Error.as_switch(), None);
    }

    #[test]
    fn test_switch_command_serialization() {
        let command = DeviceCommand::switch(true);
        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"state":true,"from":"user"}"#
        );
    }

    #[test]
    fn test_command_kind_uses_type_key() {
        let command: DeviceCommand =
            serde_json::from_value(json!({"type": "toggle", "from": "ml"})).unwrap();
        assert_eq!(command.kind.as_deref(), Some("toggle"));
        assert_eq!(command.from, Some(CommandOrigin::Ml));
    }

    #[test]
    fn test_payload_keeps_unknown_keys() {
        let payload: Payload = serde_json::from_value(json!({
            "uniqueHardwareId": "dev1",
            "firmware": "1.2.0"
        }))
        .unwrap();

        assert_eq!(payload.unique_hardware_id.as_deref(), Some("dev1"));
        assert_eq!(payload.extra.get("firmware"), Some(&json!("1.2.0")));
    }

    #[test]
    fn test_sensor_data_decoding() {
        let payload: Payload = serde_json::from_value(json!({
            "uniqueHardwareId": "dev1",
            "state": "on",
            "sensor": {
                "temp_humi": {"temperature": 21.5, "humidity": 40.0},
                "pir": {"state": true}
            }
        }))
        .unwrap();

        let sensor = payload.sensor.expect("sensor");
        assert_eq!(sensor.temp_humi.and_then(|t| t.temperature), Some(21.5));
        assert_eq!(sensor.pir, Some(PresenceReading { state: Some(true) }));
        assert!(sensor.radar.is_none());
    }

    #[test]
    fn test_partial_sensor_readings_decode() {
        let payload: Payload = serde_json::from_value(json!({
            "sensor": {
                "temp_humi": {"temperature": 21.5},
                "pir": {"state": 1},
                "radar": {"state": "maybe"}
            }
        }))
        .unwrap();

        let sensor = payload.sensor.expect("sensor");
        let temp_humi = sensor.temp_humi.expect("temp_humi");
        assert_eq!(temp_humi.temperature, Some(21.5));
        assert_eq!(temp_humi.humidity, None);
        assert_eq!(sensor.pir, Some(PresenceReading { state: Some(true) }));
        assert_eq!(sensor.radar, Some(PresenceReading { state: None }));
    }

    #[test]
    fn test_unexpected_known_values_move_to_extra() {
        let payload: Payload = serde_json::from_value(json!({
            "uniqueHardwareId": "dev1",
            "state": "expired",
            "command": {"state": true, "from": "schedule"}
        }))
        .unwrap();

        assert_eq!(payload.unique_hardware_id.as_deref(), Some("dev1"));
        assert!(payload.state.is_none());
        assert!(payload.command.is_none());
        assert_eq!(payload.extra.get("state"), Some(&json!("expired")));
        assert_eq!(
            payload.extra.get("command"),
            Some(&json!({"state": true, "from": "schedule"}))
        );
    }

    #[test]
    fn test_unexpected_value_survives_encode() {
        let payload: Payload = serde_json::from_value(json!({"state": 3})).unwrap();
        assert_eq!(serde_json::to_string(&payload).unwrap(), r#"{"state":3}"#);
    }

    #[test]
    fn test_non_object_payload_is_empty() {
        let payload: Payload = serde_json::from_value(json!("text")).unwrap();
        assert_eq!(payload, Payload::default());
    }

    #[test]
    fn test_for_device_serializes_only_id() {
        let payload = Payload::for_device("abc");
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"uniqueHardwareId":"abc"}"#
        );
    }
}
