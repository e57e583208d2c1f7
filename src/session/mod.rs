//! Session layer: authentication, dispatch and the public facade.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `auth` | `user_auth` handshake and [`AuthState`] |
//! | `builder` | [`SessionBuilder`] configuration |
//! | `core` | [`Session`] facade and [`ListenerGuard`] |
//! | `dispatch` | Listener [`Registry`] and inbound [`Dispatcher`] |

// ============================================================================
// Submodules
// ============================================================================

/// Authentication handshake and state.
pub mod auth;

/// Session configuration builder.
pub mod builder;

/// Session facade.
pub mod core;

/// Listener registry and inbound message dispatch.
pub mod dispatch;

// ============================================================================
// Re-exports
// ============================================================================

pub use auth::{AuthState, Authenticator};
pub use builder::{ENV_RECONNECT, ENV_URL, SessionBuilder};
pub use core::{ListenerGuard, Session};
pub use dispatch::{AuthFailureCallback, Dispatcher, MessageCallback, MessageHandlers, Registry};
