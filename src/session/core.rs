//! Session facade.
//!
//! [`Session`] is the only object UI code talks to. It is built once with
//! [`Session::builder()`] and handed to every consumer; clones share the same
//! connection, authenticator and listener registry.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use tokio::sync::watch;
use tracing::error;

use crate::identifiers::ListenerId;
use crate::protocol::Message;
use crate::transport::{ReadyState, Transport};

use super::auth::AuthState;
use super::builder::SessionBuilder;
use super::dispatch::{Dispatcher, MessageHandlers, Registry};

// ============================================================================
// Session
// ============================================================================

/// Shared, self-authenticating WebSocket session.
///
/// The connection closes when [`shutdown`](Self::shutdown) is called or the
/// last clone is dropped.
///
/// # Example
///
/// ```ignore
/// let session = Session::builder().url("ws://10.0.0.2:8080/ws").build()?;
///
/// let _guard = session.subscribe(
///     MessageHandlers::new().on_endpoint_state_change(|msg| {
///         println!("{:?} is now {:?}", msg.unique_hardware_id(), msg.payload);
///     }),
/// );
///
/// if session.is_authenticated() && session.connection_state().is_open() {
///     session.query_endpoint_state(None);
/// }
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    transport: Transport,
    dispatcher: Arc<Dispatcher>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("connection_state", &self.connection_state())
            .field("auth_state", &self.auth_state())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Session {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub(crate) fn new(transport: Transport, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                transport,
                dispatcher,
            }),
        }
    }

    fn registry(&self) -> &Arc<Registry> {
        self.inner.dispatcher.registry()
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Sends a raw text frame. Dropped silently if the connection is not open.
    #[inline]
    pub fn send(&self, raw: impl Into<String>) {
        self.inner.transport.send(raw);
    }

    /// Encodes and sends a message.
    pub fn send_message(&self, message: &Message) {
        match message.encode() {
            Ok(frame) => self.send(frame),
            Err(e) => error!(error = %e, kind = ?message.kind, "Failed to encode message"),
        }
    }

    /// Asks for the state of one device, or of every device when `None`.
    pub fn query_endpoint_state(&self, unique_hardware_id: Option<&str>) {
        self.send_message(&Message::query_endpoint_state(unique_hardware_id));
    }

    /// Switches a device on or off on behalf of the user.
    pub fn set_endpoint_state(&self, unique_hardware_id: impl Into<String>, on: bool) {
        self.send_message(&Message::set_endpoint_state(unique_hardware_id, on));
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Current transport state.
    #[inline]
    #[must_use]
    pub fn connection_state(&self) -> ReadyState {
        self.inner.transport.state()
    }

    /// Receiver notified on every transport state change.
    #[inline]
    #[must_use]
    pub fn watch_connection_state(&self) -> watch::Receiver<ReadyState> {
        self.inner.transport.watch_state()
    }

    /// Returns `true` once the server accepted the credential on the current
    /// connection.
    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.dispatcher.auth().is_authenticated()
    }

    /// Current authentication state.
    #[inline]
    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        self.inner.dispatcher.auth().state()
    }

    /// Receiver notified on every authentication state change.
    #[inline]
    #[must_use]
    pub fn watch_auth_state(&self) -> watch::Receiver<AuthState> {
        self.inner.dispatcher.auth().watch()
    }

    /// Most recent raw inbound frame.
    #[inline]
    #[must_use]
    pub fn last_message(&self) -> Option<String> {
        self.inner.dispatcher.last_message()
    }

    /// Receiver notified on every inbound frame.
    #[inline]
    #[must_use]
    pub fn watch_last_message(&self) -> watch::Receiver<Option<String>> {
        self.inner.dispatcher.watch_last_message()
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Registers a listener until [`unregister_listener`](Self::unregister_listener).
    ///
    /// Prefer [`subscribe`](Self::subscribe) for consumers with a lifetime.
    pub fn register_listener(&self, handlers: MessageHandlers) -> ListenerId {
        self.registry().register(handlers)
    }

    /// Replaces the handlers stored under `id`, or stores them if absent.
    pub fn replace_listener(&self, id: ListenerId, handlers: MessageHandlers) {
        self.registry().upsert(id, handlers);
    }

    /// Removes a listener. No-op if it is not registered.
    pub fn unregister_listener(&self, id: ListenerId) {
        self.registry().unregister(id);
    }

    /// Registers a listener bound to the returned guard.
    ///
    /// The listener is unregistered when the guard is dropped, on every exit
    /// path of the owner.
    pub fn subscribe(&self, handlers: MessageHandlers) -> ListenerGuard {
        let id = self.registry().register(handlers);
        ListenerGuard {
            id,
            registry: Arc::downgrade(self.registry()),
        }
    }

    /// Number of registered listeners.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.registry().len()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Closes the current connection, if any, and connects again.
    ///
    /// The handshake runs again on the new connection.
    pub fn reconnect(&self) {
        self.inner.transport.reconnect();
    }

    /// Closes the connection for good.
    pub fn shutdown(&self) {
        self.inner.transport.shutdown();
    }
}

// ============================================================================
// ListenerGuard
// ============================================================================

/// Keeps a listener registered while alive.
#[must_use = "dropping the guard unregisters the listener"]
pub struct ListenerGuard {
    id: ListenerId,
    registry: Weak<Registry>,
}

impl ListenerGuard {
    /// Handle of the guarded listener.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Swaps the guarded listener's handlers, keeping its position.
    pub fn replace(&self, handlers: MessageHandlers) {
        if let Some(registry) = self.registry.upgrade() {
            registry.upsert(self.id, handlers);
        }
    }
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ListenerGuard").field(&self.id).finish()
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
