//! WebSocket client connection and event loop.
//!
//! # Event Loop
//!
//! [`Transport::spawn`] starts one tokio task that owns the socket for the
//! whole session lifetime:
//!
//! - connects (with timeout) and reports the outcome through the handler
//! - writes the handler's handshake frame before any queued outbound frame
//! - delivers inbound text frames to [`TransportHandler::on_message`] one at a
//!   time, in arrival order
//! - writes outbound frames queued by [`Transport::send`]
//! - applies the [`ReconnectPolicy`] after every close
//!
//! Commands (send, reconnect, shutdown) are processed in every state, so a
//! closed transport with reconnects disabled still answers
//! [`Transport::reconnect`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace};

use crate::error::{Error, Result};

use super::state::{ReadyState, ReconnectPolicy};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for establishing the WebSocket connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

/// Client WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the client stream.
type WsSink = SplitSink<WsStream, WsMessage>;

// ============================================================================
// TransportHandler
// ============================================================================

/// Lifecycle hooks attached to a [`Transport`].
///
/// All hooks run on the transport task. `on_message` runs synchronously
/// inside the read step, so the next frame is not read until it returns.
#[async_trait]
pub trait TransportHandler: Send + Sync + 'static {
    /// Called once per successful open.
    ///
    /// A returned frame is written before any other outbound frame of this
    /// connection.
    async fn on_open(&self) -> Option<String>;

    /// Called for every inbound text frame.
    fn on_message(&self, frame: &str);

    /// Called when connecting, reading, or writing fails.
    fn on_error(&self, error: &Error);

    /// Called after every close, including failed connection attempts.
    fn on_close(&self);
}

// ============================================================================
// TransportConfig
// ============================================================================

/// Construction-time transport settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Endpoint URL (`ws://` or `wss://`).
    pub url: String,
    /// Behavior after close.
    pub reconnect: ReconnectPolicy,
    /// Limit for each connection attempt.
    pub connect_timeout: Duration,
}

impl TransportConfig {
    /// Creates a config with the default policy and timeout.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

// ============================================================================
// TransportCommand
// ============================================================================

/// Internal commands for the event loop.
enum TransportCommand {
    /// Write a text frame.
    Send(String),
    /// Close the current socket (if any) and connect again.
    Reconnect,
    /// Close and stop the loop.
    Shutdown,
}

/// Why a connection ended.
enum Exit {
    /// Closed by the remote or by an error; the policy decides what follows.
    Dropped,
    /// Closed for a manual reconnect.
    Restart,
    /// Closed for good.
    Shutdown,
}

/// Outcome of a connection attempt.
enum Attempt {
    /// Socket open.
    Connected(WsStream),
    /// Connect failed or timed out.
    Failed(Error),
    /// Attempt abandoned for a manual reconnect.
    Restart,
    /// Attempt abandoned for good.
    Shutdown,
}

/// Outcome of waiting while closed.
enum Idle {
    /// Policy delay elapsed.
    Retry,
    /// Reconnect requested by the caller.
    Manual,
    /// Shutdown requested or every handle dropped.
    Shutdown,
}

// ============================================================================
// Transport
// ============================================================================

/// Single persistent WebSocket connection to one endpoint.
///
/// Cloning yields another handle to the same connection. The event loop
/// stops when [`shutdown`](Self::shutdown) is called or every handle is
/// dropped.
#[derive(Clone)]
pub struct Transport {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<TransportCommand>,
    /// Ready state published by the event loop.
    state: watch::Receiver<ReadyState>,
}

impl Transport {
    /// Spawns the event loop on `runtime` and starts connecting.
    pub fn spawn(
        config: TransportConfig,
        handler: Arc<dyn TransportHandler>,
        runtime: &Handle,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ReadyState::Uninstantiated);

        runtime.spawn(Self::run_event_loop(config, handler, command_rx, state_tx));

        Self { command_tx, state }
    }

    /// Queues a text frame.
    ///
    /// Fire-and-forget: if the connection is not open the frame is dropped
    /// and nothing is reported to the caller.
    pub fn send(&self, frame: impl Into<String>) {
        if !self.state().is_open() {
            trace!(state = %self.state(), "Dropping frame, transport not open");
            return;
        }

        let _ = self.command_tx.send(TransportCommand::Send(frame.into()));
    }

    /// Returns the current ready state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ReadyState {
        *self.state.borrow()
    }

    /// Returns a receiver notified on every ready state change.
    #[inline]
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ReadyState> {
        self.state.clone()
    }

    /// Closes the current connection, if any, and connects again.
    ///
    /// This is the manual restart for [`ReconnectPolicy::Never`]; it also
    /// resets the attempt counter of a fixed policy.
    pub fn reconnect(&self) {
        let _ = self.command_tx.send(TransportCommand::Reconnect);
    }

    /// Closes the connection and stops the event loop.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(TransportCommand::Shutdown);
    }

    /// Event loop: connect, serve, apply the reconnect policy, repeat.
    async fn run_event_loop(
        config: TransportConfig,
        handler: Arc<dyn TransportHandler>,
        mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
        state_tx: watch::Sender<ReadyState>,
    ) {
        let mut attempts: u32 = 0;

        loop {
            state_tx.send_replace(ReadyState::Connecting);
            debug!(url = %config.url, attempts, "Connecting");

            let exit = match Self::connect(&config, &mut command_rx).await {
                Attempt::Connected(ws_stream) => {
                    attempts = 0;
                    Self::run_connection(ws_stream, handler.as_ref(), &mut command_rx, &state_tx)
                        .await
                }
                Attempt::Failed(e) => {
                    error!(
                        url = %config.url,
                        error = %e,
                        timed_out = e.is_timeout(),
                        "WebSocket connect failed"
                    );
                    handler.on_error(&e);
                    attempts = attempts.saturating_add(1);
                    Exit::Dropped
                }
                Attempt::Restart => Exit::Restart,
                Attempt::Shutdown => Exit::Shutdown,
            };

            // Hook first, so observers of `Closed` see its side effects.
            handler.on_close();
            state_tx.send_replace(ReadyState::Closed);
            info!(url = %config.url, "WebSocket connection closed");

            match exit {
                Exit::Shutdown => break,
                Exit::Restart => {
                    attempts = 0;
                    continue;
                }
                Exit::Dropped => {}
            }

            match Self::wait_while_closed(config.reconnect.next_delay(attempts), &mut command_rx)
                .await
            {
                Idle::Retry => {}
                Idle::Manual => attempts = 0,
                Idle::Shutdown => break,
            }
        }

        debug!("Event loop terminated");
    }

    /// Opens the socket while answering commands.
    ///
    /// A reconnect or shutdown abandons the pending attempt at once.
    async fn connect(
        config: &TransportConfig,
        command_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
    ) -> Attempt {
        let opening = Self::open(config);
        tokio::pin!(opening);

        loop {
            tokio::select! {
                result = &mut opening => {
                    return match result {
                        Ok(ws_stream) => Attempt::Connected(ws_stream),
                        Err(e) => Attempt::Failed(e),
                    };
                }

                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Send(_)) => {
                            trace!("Dropping frame, transport connecting");
                        }
                        Some(TransportCommand::Reconnect) => {
                            debug!("Reconnect requested while connecting");
                            return Attempt::Restart;
                        }
                        Some(TransportCommand::Shutdown) | None => {
                            debug!("Shutdown requested while connecting");
                            return Attempt::Shutdown;
                        }
                    }
                }
            }
        }
    }

    /// Opens the socket.
    async fn open(config: &TransportConfig) -> Result<WsStream> {
        let connecting = connect_async(config.url.as_str());
        let (ws_stream, _response) = timeout(config.connect_timeout, connecting)
            .await
            .map_err(|_| Error::connection_timeout(config.connect_timeout.as_millis() as u64))??;

        Ok(ws_stream)
    }

    /// Serves one open connection until it ends.
    async fn run_connection(
        ws_stream: WsStream,
        handler: &dyn TransportHandler,
        command_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
        state_tx: &watch::Sender<ReadyState>,
    ) -> Exit {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        // Frames queued before the open were sent while not open: drop them.
        let mut stale = 0usize;
        while let Ok(command) = command_rx.try_recv() {
            match command {
                TransportCommand::Send(_) => stale += 1,
                TransportCommand::Reconnect => {}
                TransportCommand::Shutdown => {
                    Self::close(&mut ws_write, state_tx).await;
                    return Exit::Shutdown;
                }
            }
        }
        if stale > 0 {
            debug!(count = stale, "Discarded frames queued before open");
        }

        state_tx.send_replace(ReadyState::Open);
        info!("WebSocket connection established");

        if let Some(frame) = handler.on_open().await
            && let Err(e) = ws_write.send(WsMessage::Text(frame.into())).await
        {
            let e = Error::from(e);
            error!(error = %e, "Failed to send handshake frame");
            handler.on_error(&e);
            return Exit::Dropped;
        }

        loop {
            tokio::select! {
                // Incoming frames from the endpoint
                message = ws_read.next() => {
                    match message {
                        Some(Ok(WsMessage::Text(text))) => {
                            trace!(len = text.len(), "Frame received");
                            handler.on_message(&text);
                        }

                        Some(Ok(WsMessage::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            return Exit::Dropped;
                        }

                        Some(Err(e)) => {
                            let e = Error::from(e);
                            error!(error = %e, "WebSocket error");
                            handler.on_error(&e);
                            return Exit::Dropped;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            return Exit::Dropped;
                        }

                        // Ignore Binary, Ping, Pong
                        Some(Ok(_)) => {}
                    }
                }

                // Commands from transport handles
                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Send(frame)) => {
                            if let Err(e) = ws_write.send(WsMessage::Text(frame.into())).await {
                                let e = Error::from(e);
                                error!(error = %e, "Failed to send frame");
                                handler.on_error(&e);
                                return Exit::Dropped;
                            }
                            trace!("Frame sent");
                        }

                        Some(TransportCommand::Reconnect) => {
                            debug!("Reconnect requested");
                            Self::close(&mut ws_write, state_tx).await;
                            return Exit::Restart;
                        }

                        Some(TransportCommand::Shutdown) | None => {
                            debug!("Shutdown requested");
                            Self::close(&mut ws_write, state_tx).await;
                            return Exit::Shutdown;
                        }
                    }
                }
            }
        }
    }

    /// Waits out the reconnect delay while answering commands.
    ///
    /// With no delay the wait only ends on a command.
    async fn wait_while_closed(
        delay: Option<Duration>,
        command_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
    ) -> Idle {
        match delay {
            Some(delay) => debug!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled"),
            None => debug!("Automatic reconnect disabled, waiting for manual restart"),
        }

        let sleep = async move {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return Idle::Retry,

                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Send(_)) => {
                            trace!("Dropping frame, transport closed");
                        }
                        Some(TransportCommand::Reconnect) => return Idle::Manual,
                        Some(TransportCommand::Shutdown) | None => return Idle::Shutdown,
                    }
                }
            }
        }
    }

    /// Starts the close handshake.
    async fn close(ws_write: &mut WsSink, state_tx: &watch::Sender<ReadyState>) {
        state_tx.send_replace(ReadyState::Closing);
        if let Err(e) = ws_write.close().await {
            debug!(error = %e, "Close handshake failed");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    use crate::testing::{MockServer, unused_local_url, wait_until};

    /// Records every hook call as a string.
    struct RecordingHandler {
        handshake: Option<String>,
        events: Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        fn new(handshake: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                handshake: handshake.map(str::to_string),
                events: Mutex::new(Vec::new()),
            })
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    #[async_trait]
    impl TransportHandler for RecordingHandler {
        async fn on_open(&self) -> Option<String> {
            self.events.lock().push("open".into());
            self.handshake.clone()
        }

        fn on_message(&self, frame: &str) {
            self.events.lock().push(format!("message:{frame}"));
        }

        fn on_error(&self, _error: &Error) {
            self.events.lock().push("error".into());
        }

        fn on_close(&self) {
            self.events.lock().push("close".into());
        }
    }

    fn config(url: &str, reconnect: ReconnectPolicy) -> TransportConfig {
        TransportConfig {
            url: url.to_string(),
            reconnect,
            connect_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_CONNECT_TIMEOUT.as_secs(), 30);
    }

    #[test]
    fn test_config_defaults() {
        let config = TransportConfig::new("ws://127.0.0.1:9");
        assert_eq!(config.reconnect, ReconnectPolicy::default());
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_handshake_frame_is_sent_first() {
        let mut server = MockServer::bind().await;
        let handler = RecordingHandler::new(Some("hello"));
        let transport = Transport::spawn(
            config(server.url(), ReconnectPolicy::Never),
            handler.clone(),
            &Handle::current(),
        );

        let mut conn = server.accept().await;
        wait_until(&mut transport.watch_state(), |s| s.is_open()).await;
        transport.send("after");

        assert_eq!(conn.recv().await, "hello");
        assert_eq!(conn.recv().await, "after");
        transport.shutdown();
    }

    #[tokio::test]
    async fn test_inbound_frames_delivered_in_order() {
        let mut server = MockServer::bind().await;
        let handler = RecordingHandler::new(None);
        let transport = Transport::spawn(
            config(server.url(), ReconnectPolicy::Never),
            handler.clone(),
            &Handle::current(),
        );

        let conn = server.accept().await;
        conn.send("one");
        conn.send("two");
        conn.close();

        wait_until(&mut transport.watch_state(), |s| *s == ReadyState::Closed).await;
        assert_eq!(
            handler.events(),
            vec!["open", "message:one", "message:two", "close"]
        );
    }

    #[tokio::test]
    async fn test_send_before_open_is_dropped() {
        let handler = RecordingHandler::new(None);
        let transport = Transport::spawn(
            config(&unused_local_url().await, ReconnectPolicy::Never),
            handler,
            &Handle::current(),
        );

        // Must not panic or error.
        transport.send("lost");
        assert!(!transport.state().is_open());
        transport.shutdown();
    }

    #[tokio::test]
    async fn test_connect_failure_reports_error_and_close() {
        let handler = RecordingHandler::new(None);
        let transport = Transport::spawn(
            config(&unused_local_url().await, ReconnectPolicy::Never),
            handler.clone(),
            &Handle::current(),
        );

        wait_until(&mut transport.watch_state(), |s| *s == ReadyState::Closed).await;
        assert_eq!(handler.events(), vec!["error", "close"]);
    }

    #[tokio::test]
    async fn test_reconnects_when_enabled() {
        let mut server = MockServer::bind().await;
        let handler = RecordingHandler::new(Some("auth"));
        let transport = Transport::spawn(
            config(server.url(), ReconnectPolicy::fixed(Duration::from_millis(20))),
            handler.clone(),
            &Handle::current(),
        );

        let mut first = server.accept().await;
        assert_eq!(first.recv().await, "auth");
        first.close();

        let mut second = server.accept().await;
        assert_eq!(second.recv().await, "auth");
        transport.shutdown();
    }

    #[tokio::test]
    async fn test_stays_closed_when_disabled_until_manual_reconnect() {
        let mut server = MockServer::bind().await;
        let handler = RecordingHandler::new(Some("auth"));
        let transport = Transport::spawn(
            config(server.url(), ReconnectPolicy::Never),
            handler.clone(),
            &Handle::current(),
        );

        let mut first = server.accept().await;
        assert_eq!(first.recv().await, "auth");
        first.close();

        wait_until(&mut transport.watch_state(), |s| *s == ReadyState::Closed).await;
        assert!(server.try_accept(Duration::from_millis(300)).await.is_none());

        transport.reconnect();
        let mut second = server.accept().await;
        assert_eq!(second.recv().await, "auth");
        transport.shutdown();
    }

    /// Accepts TCP connections but never answers the WebSocket handshake.
    async fn silent_listener() -> (tokio::net::TcpListener, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    fn slow_config(url: &str, reconnect: ReconnectPolicy) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_secs(30),
            ..config(url, reconnect)
        }
    }

    #[tokio::test]
    async fn test_shutdown_while_connecting_is_immediate() {
        let (listener, url) = silent_listener().await;
        let handler = RecordingHandler::new(None);
        let transport = Transport::spawn(
            slow_config(&url, ReconnectPolicy::default()),
            handler.clone(),
            &Handle::current(),
        );

        let (_stream, _) = listener.accept().await.unwrap();
        assert_eq!(transport.state(), ReadyState::Connecting);

        transport.shutdown();
        tokio::time::timeout(
            Duration::from_secs(2),
            transport.watch_state().wait_for(|s| *s == ReadyState::Closed),
        )
        .await
        .expect("shutdown waited for the connect timeout")
        .unwrap();
        assert_eq!(handler.events(), vec!["close"]);
    }

    #[tokio::test]
    async fn test_dropping_handles_while_connecting_stops_loop() {
        let (listener, url) = silent_listener().await;
        let transport = Transport::spawn(
            slow_config(&url, ReconnectPolicy::default()),
            RecordingHandler::new(None),
            &Handle::current(),
        );
        let mut state = transport.watch_state();

        let (_stream, _) = listener.accept().await.unwrap();
        drop(transport);

        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == ReadyState::Closed),
        )
        .await
        .expect("loop kept connecting after every handle was dropped")
        .unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_while_connecting_restarts_attempt() {
        let (listener, url) = silent_listener().await;
        let handler = RecordingHandler::new(None);
        let transport = Transport::spawn(
            slow_config(&url, ReconnectPolicy::Never),
            handler.clone(),
            &Handle::current(),
        );

        let (_first, _) = listener.accept().await.unwrap();
        transport.reconnect();

        let second = tokio::time::timeout(Duration::from_secs(2), listener.accept()).await;
        assert!(second.is_ok(), "no new attempt after reconnect");
        assert_eq!(handler.events(), vec!["close"]);
        transport.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_closes_connection() {
        let mut server = MockServer::bind().await;
        let handler = RecordingHandler::new(None);
        let transport = Transport::spawn(
            config(server.url(), ReconnectPolicy::default()),
            handler.clone(),
            &Handle::current(),
        );

        let _conn = server.accept().await;
        wait_until(&mut transport.watch_state(), |s| s.is_open()).await;

        transport.shutdown();
        wait_until(&mut transport.watch_state(), |s| *s == ReadyState::Closed).await;
        assert!(server.try_accept(Duration::from_millis(200)).await.is_none());
    }
}
