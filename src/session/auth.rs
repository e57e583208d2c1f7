//! Session authenticator.
//!
//! One-shot handshake per connection-open:
//!
//! ```text
//! Unauthenticated ──open, credential found──► AuthPending ──auth_success──► Authenticated
//!        ▲                                        │                             │
//!        └──────── auth_failure / close / timeout ┴─────────────────────────────┘
//! ```
//!
//! A missing credential leaves the session `Unauthenticated`; nothing retries
//! until the transport opens again.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::credential::CredentialStore;
use crate::protocol::Message;

// ============================================================================
// AuthState
// ============================================================================

/// Authentication state of the current connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AuthState {
    /// No accepted credential on this connection.
    #[default]
    Unauthenticated,
    /// `user_auth` sent, waiting for the verdict.
    AuthPending,
    /// Server answered `auth_success`.
    Authenticated,
}

impl AuthState {
    /// Returns `true` only for [`AuthState::Authenticated`].
    #[inline]
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

// ============================================================================
// Authenticator
// ============================================================================

/// Drives the `user_auth` handshake and tracks [`AuthState`].
pub struct Authenticator {
    /// Where the bearer token lives.
    store: Arc<dyn CredentialStore>,
    /// Key of the bearer token in `store`.
    credential_key: String,
    /// Give up on a pending handshake after this long.
    auth_timeout: Option<Duration>,
    /// Published state.
    state: watch::Sender<AuthState>,
    /// Incremented on every open; stale timeouts compare against it.
    epoch: AtomicU64,
}

impl Authenticator {
    /// Creates an authenticator in the `Unauthenticated` state.
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        credential_key: impl Into<String>,
        auth_timeout: Option<Duration>,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::Unauthenticated);
        Self {
            store,
            credential_key: credential_key.into(),
            auth_timeout,
            state,
            epoch: AtomicU64::new(0),
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    /// Returns `true` once the server accepted the credential.
    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Returns a receiver notified on every state change.
    #[inline]
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Starts the handshake for a freshly opened connection.
    ///
    /// Returns the `user_auth` frame to send, or `None` when no credential
    /// is available.
    pub async fn begin(self: &Arc<Self>) -> Option<String> {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.state.send_replace(AuthState::Unauthenticated);

        let token = match self.store.get(&self.credential_key).await {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => {
                warn!(key = %self.credential_key, "No token found, WebSocket cannot authenticate");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Credential store read failed, WebSocket cannot authenticate");
                return None;
            }
        };

        let frame = match Message::user_auth(token).encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to encode auth frame");
                return None;
            }
        };

        self.state.send_replace(AuthState::AuthPending);
        debug!(epoch, "WebSocket connection established, authenticating");

        if let Some(limit) = self.auth_timeout {
            Self::arm_timeout(Arc::downgrade(self), epoch, limit);
        }

        Some(frame)
    }

    /// Applies `auth_success`.
    pub fn mark_authenticated(&self) {
        let previous = self.state.send_replace(AuthState::Authenticated);
        if previous != AuthState::AuthPending {
            debug!(?previous, "auth_success without a pending handshake");
        }
    }

    /// Applies `auth_failure`.
    pub fn mark_failed(&self) {
        self.state.send_replace(AuthState::Unauthenticated);
    }

    /// Applies a transport close.
    pub fn reset(&self) {
        self.state.send_replace(AuthState::Unauthenticated);
    }

    fn arm_timeout(auth: Weak<Self>, epoch: u64, limit: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            if let Some(auth) = auth.upgrade() {
                auth.expire(epoch, limit);
            }
        });
    }

    /// Drops a still-pending handshake of connection `epoch`.
    fn expire(&self, epoch: u64, limit: Duration) {
        let expired = self.state.send_if_modified(|state| {
            if *state == AuthState::AuthPending && self.epoch.load(Ordering::Acquire) == epoch {
                *state = AuthState::Unauthenticated;
                true
            } else {
                false
            }
        });

        if expired {
            warn!(
                timeout_ms = limit.as_millis() as u64,
                "Authentication timed out"
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
