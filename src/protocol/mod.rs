//! WebSocket protocol message types.
//!
//! All frames are JSON text with a `type` discriminator, an optional
//! `payload`, and an optional human-readable `message`.
//!
//! # Protocol Overview
//!
//! | Type | Direction | Purpose |
//! |------|-----------|---------|
//! | `user_auth` | Client → Server | Authentication handshake |
//! | `auth_success` | Server → Client | Credential accepted |
//! | `auth_failure` | Server → Client | Credential rejected |
//! | `query_endpoint_state` | Client → Server | Ask for device state |
//! | `set_endpoint_state` / `user_command` | Client → Server | Device command |
//! | `endpoint_state` | Server → Client | Device state push |
//! | `new_device_connected` | Server → Client | Device bound |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Envelope and message type |
//! | `payload` | Payload, command and sensor types |

// ============================================================================
// Submodules
// ============================================================================

/// Message envelope.
pub mod message;

/// Payload types.
pub mod payload;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{Message, MessageType};
pub use payload::{
    CommandOrigin, DeviceCommand, EndpointState, Payload, PresenceReading, SensorData, TempHumi,
};
