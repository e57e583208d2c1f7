//! In-process WebSocket endpoint for tests.
//!
//! [`MockServer`] binds `127.0.0.1:0` and hands every accepted client to the
//! test as a [`MockConnection`], which can read the client's frames and push
//! frames or a close back.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for anything a test waits on.
pub(crate) const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Helpers
// ============================================================================

/// Installs a test subscriber once; `RUST_LOG` controls the output.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Waits until the watched value satisfies `predicate`.
pub(crate) async fn wait_until<T>(
    rx: &mut watch::Receiver<T>,
    predicate: impl FnMut(&T) -> bool,
) {
    timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for watched value")
        .expect("watch sender dropped");
}

/// Returns a `ws://` URL on a local port nothing listens on.
pub(crate) async fn unused_local_url() -> String {
    let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
        .await
        .expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("ws://127.0.0.1:{port}")
}

// ============================================================================
// MockServer
// ============================================================================

/// Local WebSocket endpoint accepting any number of clients.
pub(crate) struct MockServer {
    url: String,
    accepted: mpsc::UnboundedReceiver<MockConnection>,
    accept_task: JoinHandle<()>,
}

impl MockServer {
    /// Binds to a random local port and starts accepting.
    pub(crate) async fn bind() -> Self {
        init_tracing();

        let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .await
            .expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let (accepted_tx, accepted) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (inbound_tx, inbound) = mpsc::unbounded_channel();
                let (outbound, outbound_rx) = mpsc::unbounded_channel();
                tokio::spawn(serve(stream, inbound_tx, outbound_rx));

                if accepted_tx
                    .send(MockConnection { inbound, outbound })
                    .is_err()
                {
                    break;
                }
            }
        });

        Self {
            url: format!("ws://127.0.0.1:{port}"),
            accepted,
            accept_task,
        }
    }

    /// Endpoint URL.
    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Waits for the next client.
    pub(crate) async fn accept(&mut self) -> MockConnection {
        self.try_accept(WAIT).await.expect("no client connected")
    }

    /// Waits up to `wait` for the next client.
    pub(crate) async fn try_accept(&mut self, wait: Duration) -> Option<MockConnection> {
        timeout(wait, self.accepted.recv()).await.ok().flatten()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

// ============================================================================
// MockConnection
// ============================================================================

enum Outbound {
    Text(String),
    Close,
}

/// Server side of one accepted client. Dropping it closes the socket.
pub(crate) struct MockConnection {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl MockConnection {
    /// Pushes a text frame to the client.
    pub(crate) fn send(&self, frame: impl Into<String>) {
        let _ = self.outbound.send(Outbound::Text(frame.into()));
    }

    /// Closes the socket from the server side.
    pub(crate) fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Waits for the next frame from the client.
    pub(crate) async fn recv(&mut self) -> String {
        self.try_recv(WAIT).await.expect("no frame received")
    }

    /// Waits up to `wait` for the next frame from the client.
    pub(crate) async fn try_recv(&mut self, wait: Duration) -> Option<String> {
        timeout(wait, self.inbound.recv()).await.ok().flatten()
    }
}

/// Per-client I/O loop.
async fn serve(
    stream: TcpStream,
    inbound_tx: mpsc::UnboundedSender<String>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    let Ok(ws_stream) = accept_async(stream).await else {
        return;
    };
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(WsMessage::Text(text))) => {
                        let _ = inbound_tx.send(text.to_string());
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }

            command = outbound_rx.recv() => {
                match command {
                    Some(Outbound::Text(text)) => {
                        if ws_write.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }
}
