//! WebSocket transport layer.
//!
//! One client connection to one configured endpoint, shared by the whole
//! session.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                              ┌─────────────────┐
//! │  Session (Rust)  │                              │  Backend        │
//! │                  │         WebSocket            │                 │
//! │  Transport       │◄────────────────────────────►│  /ws endpoint   │
//! │  → event loop    │      ws:// or wss://         │                 │
//! └──────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Transport::spawn` - Start the event loop, state `Connecting`
//! 2. Open - state `Open`, handler's handshake frame written first
//! 3. Frames flow both ways until the remote closes or an error occurs
//! 4. Close - state `Closed`, then the [`ReconnectPolicy`] decides
//! 5. `Transport::shutdown` - Close for good
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Event loop, handler trait, config |
//! | `state` | Ready state and reconnect policy |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket client connection and event loop.
pub mod connection;

/// Ready state and reconnect policy.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{DEFAULT_CONNECT_TIMEOUT, Transport, TransportConfig, TransportHandler};
pub use state::{ReadyState, ReconnectPolicy};
