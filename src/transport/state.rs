//! Connection ready state and reconnect policy.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Delay between automatic reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Automatic reconnect attempts before giving up.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 20;

// ============================================================================
// ReadyState
// ============================================================================

/// Logical state of the transport connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReadyState {
    /// No connection attempt made yet.
    #[default]
    Uninstantiated,
    /// Handshake with the endpoint in progress.
    Connecting,
    /// Frames can be sent and received.
    Open,
    /// Close requested, waiting for the socket to shut down.
    Closing,
    /// Socket closed or never opened.
    Closed,
}

impl ReadyState {
    /// Returns `true` if frames can be sent.
    #[inline]
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns a human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Uninstantiated => "Uninstantiated",
            Self::Connecting => "Connecting",
            Self::Open => "Open",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// What the transport does after the connection closes.
///
/// Every new open re-runs the full authentication handshake; nothing is
/// resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Single attempt. A closed transport stays closed until
    /// [`Transport::reconnect`](super::Transport::reconnect) is called.
    Never,
    /// Retry after a fixed interval.
    Fixed {
        /// Delay before each attempt.
        interval: Duration,
        /// Consecutive failed attempts allowed; `None` retries forever.
        max_attempts: Option<u32>,
    },
}

impl ReconnectPolicy {
    /// Fixed-interval retry with the given delay and no attempt limit.
    #[inline]
    #[must_use]
    pub const fn fixed(interval: Duration) -> Self {
        Self::Fixed {
            interval,
            max_attempts: None,
        }
    }

    /// Returns `true` if the transport reconnects on its own.
    #[inline]
    #[must_use]
    pub const fn should_reconnect(&self) -> bool {
        matches!(self, Self::Fixed { .. })
    }

    /// Delay before the next attempt, given the attempts already made since
    /// the last successful open. `None` means stop.
    #[must_use]
    pub fn next_delay(&self, attempts: u32) -> Option<Duration> {
        match *self {
            Self::Never => None,
            Self::Fixed {
                interval,
                max_attempts,
            } => match max_attempts {
                Some(max) if attempts >= max => None,
                _ => Some(interval),
            },
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed {
            interval: DEFAULT_RECONNECT_INTERVAL,
            max_attempts: Some(DEFAULT_RECONNECT_ATTEMPTS),
        }
    }
}

impl From<bool> for ReconnectPolicy {
    fn from(should_reconnect: bool) -> Self {
        if should_reconnect {
            Self::default()
        } else {
            Self::Never
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
