//! Session message envelope.
//!
//! # Format
//!
//! ```json
//! {
//!   "type": "endpoint_state",
//!   "payload": { "uniqueHardwareId": "dev1", "state": "on" },
//!   "message": "optional failure text"
//! }
//! ```
//!
//! A `type` outside the known set decodes to [`MessageType::Unknown`] and is
//! ignored by the dispatcher rather than rejected. Only a frame that is not a
//! JSON object with a string `type` fails to decode; payload content of an
//! unexpected shape is kept raw (see [`Payload`]).

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Result;

use super::payload::{DeviceCommand, Payload};

// ============================================================================
// MessageType
// ============================================================================

/// Logical type of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Client → server authentication handshake.
    UserAuth,
    /// Server accepted the credential.
    AuthSuccess,
    /// Server rejected the credential.
    AuthFailure,
    /// Client asks for the state of one or all devices.
    QueryEndpointState,
    /// Client commands a device.
    SetEndpointState,
    /// Client command (alternate name used by some backends).
    UserCommand,
    /// Server pushes a device state.
    EndpointState,
    /// Server announces a freshly bound device.
    NewDeviceConnected,
    /// Any type this client does not know.
    #[serde(other)]
    Unknown,
}

// ============================================================================
// Message
// ============================================================================

/// One frame of the session protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Frame type.
    #[serde(rename = "type")]
    pub kind: MessageType,

    /// Optional structured body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,

    /// Human-readable text, present on failures.
    #[serde(
        default,
        deserialize_with = "text",
        skip_serializing_if = "Option::is_none"
    )]
    pub message: Option<String>,
}

/// Reads `message` as text; non-string values keep their JSON rendering.
fn text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

impl Message {
    /// Creates a message with no payload.
    #[inline]
    #[must_use]
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            payload: None,
            message: None,
        }
    }

    /// Creates a message carrying `payload`.
    #[inline]
    #[must_use]
    pub fn with_payload(kind: MessageType, payload: Payload) -> Self {
        Self {
            kind,
            payload: Some(payload),
            message: None,
        }
    }

    /// Builds the authentication handshake frame.
    #[must_use]
    pub fn user_auth(token: impl Into<String>) -> Self {
        Self::with_payload(
            MessageType::UserAuth,
            Payload {
                token: Some(token.into()),
                ..Default::default()
            },
        )
    }

    /// Builds a state query.
    ///
    /// Without an id the backend answers with one `endpoint_state` per device.
    #[must_use]
    pub fn query_endpoint_state(unique_hardware_id: Option<&str>) -> Self {
        match unique_hardware_id {
            Some(id) => {
                Self::with_payload(MessageType::QueryEndpointState, Payload::for_device(id))
            }
            None => Self::new(MessageType::QueryEndpointState),
        }
    }

    /// Builds a user switch command for one device.
    #[must_use]
    pub fn set_endpoint_state(unique_hardware_id: impl Into<String>, on: bool) -> Self {
        Self::with_payload(
            MessageType::SetEndpointState,
            Payload {
                command: Some(DeviceCommand::switch(on)),
                ..Payload::for_device(unique_hardware_id)
            },
        )
    }

    /// Decodes a raw text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the frame is not a
    /// valid message.
    pub fn decode(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Encodes this message as a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Returns the device id from the payload, if any.
    #[inline]
    #[must_use]
    pub fn unique_hardware_id(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.unique_hardware_id.as_deref())
    }
}

// ============================================================================
// Tests
// ============================================================================
