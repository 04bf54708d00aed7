//! Fan-out of upstream payloads to connected viewers.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::connection::{ViewerConnection, ViewerId};
use crate::errors::{RelayError, SendFailure};
use crate::message::RelayMessage;
use crate::metrics::WS_SLOW_VIEWER_EVICTIONS_TOTAL;

/// Outcome counts of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Viewers the payload was queued for.
    pub delivered: usize,
    /// Viewers removed because the payload could not be queued.
    pub removed: usize,
}

/// The set of connected viewers.
pub struct ViewerRegistry {
    viewers: RwLock<HashMap<ViewerId, Arc<ViewerConnection>>>,
}

impl ViewerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            viewers: RwLock::new(HashMap::new()),
        }
    }

    /// Add a viewer.
    pub async fn add(&self, viewer: Arc<ViewerConnection>) {
        let mut viewers = self.viewers.write().await;
        let _ = viewers.insert(viewer.id, viewer);
    }

    /// Remove a viewer. Returns whether it was present.
    pub async fn remove(&self, id: ViewerId) -> bool {
        let mut viewers = self.viewers.write().await;
        viewers.remove(&id).is_some()
    }

    /// Number of registered viewers.
    pub async fn connection_count(&self) -> usize {
        self.viewers.read().await.len()
    }

    /// Snapshot of the registered viewers.
    pub async fn connections(&self) -> Vec<Arc<ViewerConnection>> {
        self.viewers.read().await.values().cloned().collect()
    }

    /// Queue `payload` for every viewer.
    ///
    /// The read lock is held for the whole enumeration, so membership cannot
    /// change mid-broadcast. A viewer whose queue is full or closed is
    /// removed afterwards and told to close; the rest still receive the
    /// payload. A viewer either gets every payload in order or is gone.
    pub async fn broadcast(&self, payload: RelayMessage) -> BroadcastReport {
        let payload = Arc::new(payload);
        let mut report = BroadcastReport::default();
        let mut failed: Vec<(Arc<ViewerConnection>, RelayError)> = Vec::new();
        {
            let viewers = self.viewers.read().await;
            debug!(
                recipients = viewers.len(),
                kind = payload.kind(),
                len = payload.len(),
                "broadcast upstream payload"
            );
            for viewer in viewers.values() {
                match viewer.deliver(Arc::clone(&payload)) {
                    Ok(()) => report.delivered += 1,
                    Err(error) => failed.push((Arc::clone(viewer), error)),
                }
            }
        }

        if failed.is_empty() {
            return report;
        }

        let mut viewers = self.viewers.write().await;
        for (viewer, error) in failed {
            if viewers.remove(&viewer.id).is_some() {
                report.removed += 1;
            }
            if matches!(
                error,
                RelayError::ViewerSendFailure { cause: SendFailure::QueueFull, .. }
            ) {
                counter!(WS_SLOW_VIEWER_EVICTIONS_TOTAL).increment(1);
                warn!(viewer_id = %viewer.id, error = %error, "evicting slow viewer");
            } else {
                debug!(viewer_id = %viewer.id, error = %error, "removed closed viewer");
            }
            viewer.evict();
        }
        report
    }
}

impl Default for ViewerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
