//! Listener registry and inbound frame dispatch.
//!
//! Routing is by message type only. An `endpoint_state` frame reaches every
//! listener that declared `on_endpoint_state_change`, whatever device it is
//! about; each listener filters on `uniqueHardwareId` itself. A device-list
//! consumer and a device-detail consumer can therefore share one stream.
//!
//! Listeners are notified in registration order. Each dispatch iterates over
//! a snapshot of the registry, so handlers may register or unregister
//! listeners (themselves included) while being called.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, trace};

use crate::error::Error;
use crate::identifiers::ListenerId;
use crate::protocol::{Message, MessageType};
use crate::transport::TransportHandler;

use super::auth::Authenticator;

// ============================================================================
// Types
// ============================================================================

/// Callback receiving a decoded message.
pub type MessageCallback = Box<dyn Fn(&Message) + Send + Sync>;

/// Callback receiving the failure text of `auth_failure`.
pub type AuthFailureCallback = Box<dyn Fn(Option<&str>) + Send + Sync>;

// ============================================================================
// MessageHandlers
// ============================================================================

/// Set of optional callbacks a listener is interested in.
///
/// # Example
///
/// ```ignore
/// let handlers = MessageHandlers::new()
///     .on_endpoint_state_change(|msg| println!("{:?}", msg.payload))
///     .on_auth_failure(|reason| println!("logged out: {reason:?}"));
/// ```
#[derive(Default)]
pub struct MessageHandlers {
    endpoint_state_change: Option<MessageCallback>,
    auth_success: Option<MessageCallback>,
    auth_failure: Option<AuthFailureCallback>,
}

impl MessageHandlers {
    /// Creates an empty handler set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for every `endpoint_state` frame.
    #[must_use]
    pub fn on_endpoint_state_change(
        mut self,
        handler: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Self {
        self.endpoint_state_change = Some(Box::new(handler));
        self
    }

    /// Called when the server accepts the credential.
    #[must_use]
    pub fn on_auth_success(mut self, handler: impl Fn(&Message) + Send + Sync + 'static) -> Self {
        self.auth_success = Some(Box::new(handler));
        self
    }

    /// Called with the server's failure text when it rejects the credential.
    #[must_use]
    pub fn on_auth_failure(
        mut self,
        handler: impl Fn(Option<&str>) + Send + Sync + 'static,
    ) -> Self {
        self.auth_failure = Some(Box::new(handler));
        self
    }

    /// Returns `true` if no callback is declared.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoint_state_change.is_none()
            && self.auth_success.is_none()
            && self.auth_failure.is_none()
    }
}

impl fmt::Debug for MessageHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHandlers")
            .field("endpoint_state_change", &self.endpoint_state_change.is_some())
            .field("auth_success", &self.auth_success.is_some())
            .field("auth_failure", &self.auth_failure.is_some())
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Listeners keyed by handle, ordered by registration.
#[derive(Debug, Default)]
pub struct Registry {
    listeners: Mutex<BTreeMap<ListenerId, Arc<MessageHandlers>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handlers` under a fresh handle.
    pub fn register(&self, handlers: MessageHandlers) -> ListenerId {
        let id = ListenerId::next();
        self.listeners.lock().insert(id, Arc::new(handlers));
        trace!(%id, "Listener registered");
        id
    }

    /// Stores `handlers` under `id`, replacing any previous registration.
    ///
    /// A replaced listener keeps its position in the notification order.
    /// Returns `true` if a registration was replaced.
    pub fn upsert(&self, id: ListenerId, handlers: MessageHandlers) -> bool {
        let replaced = self
            .listeners
            .lock()
            .insert(id, Arc::new(handlers))
            .is_some();
        trace!(%id, replaced, "Listener stored");
        replaced
    }

    /// Removes the listener. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let removed = self.listeners.lock().remove(&id).is_some();
        if removed {
            trace!(%id, "Listener unregistered");
        }
        removed
    }

    /// Returns `true` if `id` is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.lock().contains_key(&id)
    }

    /// Number of registered listeners.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Calls `on_endpoint_state_change` on every listener declaring it.
    /// Returns the number of calls made.
    pub fn notify_endpoint_state(&self, message: &Message) -> usize {
        self.each(|handlers| handlers.endpoint_state_change.as_ref().map(|f| f(message)))
    }

    /// Calls `on_auth_success` on every listener declaring it.
    pub fn notify_auth_success(&self, message: &Message) -> usize {
        self.each(|handlers| handlers.auth_success.as_ref().map(|f| f(message)))
    }

    /// Calls `on_auth_failure` on every listener declaring it.
    pub fn notify_auth_failure(&self, reason: Option<&str>) -> usize {
        self.each(|handlers| handlers.auth_failure.as_ref().map(|f| f(reason)))
    }

    /// Runs `call` over a snapshot; the lock is not held during callbacks.
    fn each(&self, call: impl Fn(&MessageHandlers) -> Option<()>) -> usize {
        let snapshot: Vec<Arc<MessageHandlers>> =
            self.listeners.lock().values().cloned().collect();
        snapshot
            .iter()
            .filter_map(|handlers| call(&**handlers))
            .count()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Transport handler tying the authenticator and the registry together.
pub struct Dispatcher {
    registry: Arc<Registry>,
    auth: Arc<Authenticator>,
    last_message: watch::Sender<Option<String>>,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry` and `auth`.
    #[must_use]
    pub fn new(registry: Arc<Registry>, auth: Arc<Authenticator>) -> Self {
        let (last_message, _) = watch::channel(None);
        Self {
            registry,
            auth,
            last_message,
        }
    }

    /// Listener registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Session authenticator.
    #[inline]
    #[must_use]
    pub fn auth(&self) -> &Arc<Authenticator> {
        &self.auth
    }

    /// Most recent raw inbound frame.
    #[inline]
    #[must_use]
    pub fn last_message(&self) -> Option<String> {
        self.last_message.borrow().clone()
    }

    /// Receiver notified on every inbound frame.
    #[inline]
    #[must_use]
    pub fn watch_last_message(&self) -> watch::Receiver<Option<String>> {
        self.last_message.subscribe()
    }

    /// Decodes one inbound frame and routes it.
    ///
    /// Malformed frames are logged and dropped.
    pub fn dispatch(&self, frame: &str) {
        self.last_message.send_replace(Some(frame.to_string()));

        let message = match Message::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Error parsing WebSocket message");
                return;
            }
        };

        match message.kind {
            MessageType::AuthSuccess => {
                info!("WebSocket authenticated successfully");
                self.auth.mark_authenticated();
                self.registry.notify_auth_success(&message);
            }

            MessageType::AuthFailure => {
                error!(reason = ?message.message, "WebSocket authentication failed");
                self.auth.mark_failed();
                self.registry.notify_auth_failure(message.message.as_deref());
            }

            MessageType::EndpointState => {
                let notified = self.registry.notify_endpoint_state(&message);
                debug!(
                    device = ?message.unique_hardware_id(),
                    notified,
                    "Received endpoint state change"
                );
            }

            other => trace!(kind = ?other, "Ignoring unhandled message type"),
        }
    }
}

#[async_trait]
impl TransportHandler for Dispatcher {
    async fn on_open(&self) -> Option<String> {
        self.auth.begin().await
    }

    fn on_message(&self, frame: &str) {
        self.dispatch(frame);
    }

    fn on_error(&self, error: &Error) {
        debug!(
            error = %error,
            connection = error.is_connection_error(),
            "Transport error contained in session"
        );
    }

    fn on_close(&self) {
        self.auth.reset();
    }
}

// ============================================================================
// Tests
// ============================================================================
