//! Builder pattern for session configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use switch_session::{FileCredentialStore, Session};
//!
//! # async fn example() -> switch_session::Result<()> {
//! let session = Session::builder()
//!     .url("ws://192.168.1.10:8080/ws")
//!     .credential_store(Arc::new(FileCredentialStore::new("credentials.json")))
//!     .reconnect(true)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use url::Url;

use crate::credential::{CredentialStore, DEFAULT_CREDENTIAL_KEY, MemoryCredentialStore};
use crate::error::{Error, Result};
use crate::transport::{
    DEFAULT_CONNECT_TIMEOUT, ReconnectPolicy, Transport, TransportConfig, TransportHandler,
};

use super::auth::Authenticator;
use super::core::Session;
use super::dispatch::{Dispatcher, Registry};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable holding the endpoint URL.
pub const ENV_URL: &str = "SWITCH_SESSION_WS_URL";

/// Environment variable enabling (`true`) or disabling (`false`) reconnects.
pub const ENV_RECONNECT: &str = "SWITCH_SESSION_RECONNECT";

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`].
///
/// Use [`Session::builder()`] to create a new builder.
#[derive(Clone)]
pub struct SessionBuilder {
    /// Endpoint URL.
    url: Option<String>,
    /// Credential source; an empty in-memory store when unset.
    store: Option<Arc<dyn CredentialStore>>,
    /// Key of the bearer token.
    credential_key: String,
    /// Behavior after close.
    reconnect: ReconnectPolicy,
    /// Limit for each connection attempt.
    connect_timeout: Duration,
    /// Limit for a pending handshake; unlimited when unset.
    auth_timeout: Option<Duration>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            url: None,
            store: None,
            credential_key: DEFAULT_CREDENTIAL_KEY.to_string(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            auth_timeout: None,
        }
    }
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("url", &self.url)
            .field("store", &self.store.is_some())
            .field("credential_key", &self.credential_key)
            .field("reconnect", &self.reconnect)
            .field("connect_timeout", &self.connect_timeout)
            .field("auth_timeout", &self.auth_timeout)
            .finish()
    }
}

// ============================================================================
// SessionBuilder Implementation
// ============================================================================

impl SessionBuilder {
    /// Creates a builder with default settings and no URL.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from [`ENV_URL`] and [`ENV_RECONNECT`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL variable is unset
    /// - [`Error::Config`] if the reconnect variable is not a boolean
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a builder reading variables through `lookup`.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let url = lookup(ENV_URL).ok_or_else(|| Error::config(format!("{ENV_URL} is not set")))?;
        let mut builder = Self::new().url(url);

        if let Some(value) = lookup(ENV_RECONNECT) {
            let reconnect = parse_bool(&value).ok_or_else(|| {
                Error::config(format!("{ENV_RECONNECT} must be true or false, got {value:?}"))
            })?;
            builder = builder.reconnect(reconnect);
        }

        Ok(builder)
    }

    /// Sets the endpoint URL (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the store the bearer token is read from.
    #[inline]
    #[must_use]
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the key of the bearer token. Defaults to `"user-token"`.
    #[inline]
    #[must_use]
    pub fn credential_key(mut self, key: impl Into<String>) -> Self {
        self.credential_key = key.into();
        self
    }

    /// Enables the default fixed-interval reconnect, or disables reconnects.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, should_reconnect: bool) -> Self {
        self.reconnect = ReconnectPolicy::from(should_reconnect);
        self
    }

    /// Sets the reconnect policy directly.
    #[inline]
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Sets the limit for each connection attempt.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Drops a pending handshake back to unauthenticated after `timeout`.
    #[inline]
    #[must_use]
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = Some(timeout);
        self
    }

    /// Validates the configuration and starts connecting.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is missing, malformed, or not `ws`/`wss`
    /// - [`Error::Config`] if a timeout is zero
    /// - [`Error::Config`] if called outside a Tokio runtime
    pub fn build(self) -> Result<Session> {
        let url = self.validate_url()?;
        self.validate_timeouts()?;

        let runtime = Handle::try_current()
            .map_err(|_| Error::config("Session must be built inside a Tokio runtime"))?;

        let store = self.store.unwrap_or_else(|| {
            Arc::new(MemoryCredentialStore::new()) as Arc<dyn CredentialStore>
        });
        let auth = Arc::new(Authenticator::new(
            store,
            self.credential_key,
            self.auth_timeout,
        ));
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(Registry::new()), auth));

        let config = TransportConfig {
            url,
            reconnect: self.reconnect,
            connect_timeout: self.connect_timeout,
        };
        let handler: Arc<dyn TransportHandler> = dispatcher.clone();
        let transport = Transport::spawn(config, handler, &runtime);

        Ok(Session::new(transport, dispatcher))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionBuilder {
    /// Validates the endpoint URL.
    fn validate_url(&self) -> Result<String> {
        let raw = self.url.as_deref().ok_or_else(|| {
            Error::config(
                "WebSocket URL is required. Use .url() to set it.\n\
                 Example: Session::builder().url(\"ws://192.168.1.10:8080/ws\")",
            )
        })?;

        let url = Url::parse(raw)
            .map_err(|e| Error::config(format!("Invalid WebSocket URL {raw:?}: {e}")))?;

        match url.scheme() {
            "ws" => {}
            "wss" if cfg!(feature = "tls") => {}
            "wss" => {
                return Err(Error::config(
                    "wss:// endpoints require the `tls` feature",
                ));
            }
            scheme => {
                return Err(Error::config(format!(
                    "Unsupported URL scheme {scheme:?}, expected ws or wss"
                )));
            }
        }

        Ok(url.into())
    }

    /// Validates the timeouts.
    fn validate_timeouts(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(Error::config("Connect timeout must be greater than zero"));
        }
        if self.auth_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config("Auth timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// Parses the boolean spellings accepted in environment variables.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
