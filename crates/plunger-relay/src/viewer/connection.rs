//! Viewer connection state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::{RelayError, Result, SendFailure};
use crate::message::RelayMessage;

/// Unique identifier of a viewer connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ViewerId(Uuid);

impl ViewerId {
    /// Generate a fresh, time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ViewerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Point-in-time view of a viewer for status output.
#[derive(Clone, Debug, Serialize)]
pub struct ViewerSummary {
    /// Connection id.
    pub id: ViewerId,
    /// When the viewer connected.
    pub connected_at: DateTime<Utc>,
    /// Seconds since the viewer connected.
    pub connected_secs: u64,
}

/// A connected viewer.
///
/// Outbound payloads go through a bounded channel drained by the viewer's own
/// writer task, so delivery never waits on a slow socket. A viewer that
/// cannot take a payload is evicted: the registry drops it and the session
/// watching [`ViewerConnection::evicted`] closes the socket.
pub struct ViewerConnection {
    /// Unique connection ID.
    pub id: ViewerId,
    /// Send channel to the viewer's WebSocket write task.
    tx: mpsc::Sender<Arc<RelayMessage>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Wall-clock time of establishment, for status output.
    pub connected_at_utc: DateTime<Utc>,
    /// Whether the viewer has responded to the last ping.
    pub is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    eviction: CancellationToken,
}

impl ViewerConnection {
    /// Create a connection with a fresh id.
    pub fn new(tx: mpsc::Sender<Arc<RelayMessage>>) -> Self {
        Self::with_id(ViewerId::new(), tx)
    }

    /// Create a connection with a specific id.
    pub fn with_id(id: ViewerId, tx: mpsc::Sender<Arc<RelayMessage>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            connected_at_utc: Utc::now(),
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            eviction: CancellationToken::new(),
        }
    }

    /// Queue a payload for this viewer without waiting.
    ///
    /// A full queue is a failure like a closed one; the payload is not
    /// retried.
    pub fn deliver(&self, payload: Arc<RelayMessage>) -> Result<()> {
        self.tx.try_send(payload).map_err(|e| {
            let cause = match e {
                TrySendError::Full(_) => SendFailure::QueueFull,
                TrySendError::Closed(_) => SendFailure::Closed,
            };
            RelayError::ViewerSendFailure {
                viewer: self.id,
                cause,
            }
        })
    }

    /// Tell the viewer's session to close.
    pub fn evict(&self) {
        self.eviction.cancel();
    }

    /// Whether [`evict`](Self::evict) has been called.
    pub fn is_evicted(&self) -> bool {
        self.eviction.is_cancelled()
    }

    /// Resolves once the viewer has been evicted.
    pub async fn evicted(&self) {
        self.eviction.cancelled().await;
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Status view of this viewer.
    pub fn summary(&self) -> ViewerSummary {
        ViewerSummary {
            id: self.id,
            connected_at: self.connected_at_utc,
            connected_secs: self.age().as_secs(),
        }
    }
}

impl fmt::Debug for ViewerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewerConnection")
            .field("id", &self.id)
            .field("connected_at_utc", &self.connected_at_utc)
            .field("evicted", &self.is_evicted())
            .finish_non_exhaustive()
    }
}
