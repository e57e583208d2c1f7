//! Switch Session - Self-authenticating WebSocket session for smart switches.
//!
//! This library keeps one WebSocket connection to a device backend, logs in
//! with a stored bearer token every time the connection opens, and fans
//! inbound events out to any number of registered listeners.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐            ┌─────────────┐
//! │ Session                                  │            │  Backend    │
//! │                                          │ WebSocket  │             │
//! │  Transport ──► Dispatcher ──► Registry   │◄──────────►│  /ws        │
//! │     ▲              │            │        │            │             │
//! │     └── on_open ── Authenticator│        │            └─────────────┘
//! │                                 ▼        │
//! │                       listener callbacks │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Key design principles:
//!
//! - One [`Session`] per application, cloned into every consumer
//! - `user_auth` is always the first frame on a new connection
//! - Listeners live exactly as long as their [`ListenerGuard`]
//! - Malformed frames are logged and dropped, never fatal
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use switch_session::{FileCredentialStore, MessageHandlers, Result, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::builder()
//!         .url("ws://192.168.1.20:8080/ws")
//!         .credential_store(Arc::new(FileCredentialStore::new("credentials.json")))
//!         .build()?;
//!
//!     let _guard = session.subscribe(
//!         MessageHandlers::new()
//!             .on_auth_success(|_| println!("logged in"))
//!             .on_endpoint_state_change(|msg| {
//!                 println!("{:?}: {:?}", msg.unique_hardware_id(), msg.payload);
//!             }),
//!     );
//!
//!     let mut auth = session.watch_auth_state();
//!     auth.wait_for(|state| state.is_authenticated()).await.ok();
//!
//!     session.query_endpoint_state(None);
//!     session.set_endpoint_state("a1b2c3", true);
//!
//!     tokio::signal::ctrl_c().await?;
//!     session.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`credential`] | Token storage: [`CredentialStore`] and implementations |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | WebSocket message types |
//! | [`session`] | [`Session`] facade, authenticator and dispatch |
//! | [`transport`] | WebSocket client connection and reconnect |
//!
//! # Features
//!
//! - **`tls`**: accept `wss://` endpoints (rustls with webpki roots)

// ============================================================================
// Modules
// ============================================================================

/// Bearer token storage.
pub mod credential;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// WebSocket protocol message types.
///
/// JSON frames with a `type` discriminator and an optional `payload`.
pub mod protocol;

/// Session facade, authentication and listener dispatch.
///
/// Use [`Session::builder()`] to create a configured session.
pub mod session;

/// WebSocket transport layer.
///
/// Client connection, ready state and reconnect policy.
pub mod transport;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Credential types
pub use credential::{
    CredentialStore, DEFAULT_CREDENTIAL_KEY, FileCredentialStore, MemoryCredentialStore,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::ListenerId;

// Protocol types
pub use protocol::{
    CommandOrigin, DeviceCommand, EndpointState, Message, MessageType, Payload, PresenceReading,
    SensorData, TempHumi,
};

// Session types
pub use session::{AuthState, ListenerGuard, MessageHandlers, Session, SessionBuilder};

// Transport types
pub use transport::{ReadyState, ReconnectPolicy};
