//! Relay error types.

use std::fmt;

use thiserror::Error;

use crate::viewer::connection::ViewerId;

/// Why an upstream connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame.
    CloseFrame {
        /// WebSocket close code.
        code: u16,
        /// Close reason text (may be empty).
        reason: String,
    },
    /// The stream ended without a close frame.
    EndOfStream,
    /// A read or write on the transport failed.
    Transport(String),
    /// The process is shutting down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CloseFrame { code, reason } if reason.is_empty() => {
                write!(f, "close frame (code {code})")
            }
            Self::CloseFrame { code, reason } => write!(f, "close frame (code {code}): {reason}"),
            Self::EndOfStream => f.write_str("stream ended without close frame"),
            Self::Transport(message) => write!(f, "transport error: {message}"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Why a payload could not be queued for a viewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendFailure {
    /// The viewer's outbound queue is full.
    QueueFull,
    /// The viewer's writer task is gone.
    Closed,
}

impl fmt::Display for SendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => f.write_str("outbound queue full"),
            Self::Closed => f.write_str("channel closed"),
        }
    }
}

/// Errors produced by the relay core.
///
/// None of these are fatal: connect failures and closures feed the reconnect
/// loop, `NotConnected` is a silent drop, and viewer failures remove the
/// viewer.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Upstream unreachable or the WebSocket handshake failed.
    #[error("failed to connect to {url}: {message}")]
    ConnectFailure {
        /// Target URL.
        url: String,
        /// Underlying error text.
        message: String,
    },

    /// The upstream transport closed.
    #[error("upstream transport closed: {0}")]
    TransportClosed(CloseReason),

    /// A send was attempted while the upstream link was down.
    #[error("upstream link is not connected")]
    NotConnected,

    /// A payload could not be queued for a viewer; the viewer is removed.
    #[error("failed to deliver to viewer {viewer}: {cause}")]
    ViewerSendFailure {
        /// The viewer that could not be reached.
        viewer: ViewerId,
        /// Why the send failed.
        cause: SendFailure,
    },
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
