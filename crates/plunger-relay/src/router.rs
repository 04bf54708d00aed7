//! Routes payloads between the upstream link and the viewers.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::errors::{RelayError, Result};
use crate::message::RelayMessage;
use crate::metrics::{VIEWER_COMMANDS_DROPPED_TOTAL, VIEWER_COMMANDS_TOTAL};
use crate::upstream::link::UpstreamLink;
use crate::upstream::supervisor::InboundHandler;
use crate::viewer::connection::{ViewerConnection, ViewerId};
use crate::viewer::registry::{BroadcastReport, ViewerRegistry};

/// Glue between upstream and viewers.
///
/// Payloads pass through untouched in both directions. The most recent
/// upstream payload is kept so HTTP clients can read the current status.
pub struct RelayRouter {
    registry: Arc<ViewerRegistry>,
    upstream: Arc<UpstreamLink>,
    latest: RwLock<Option<RelayMessage>>,
}

impl RelayRouter {
    /// Create a router over an existing registry and link.
    pub fn new(registry: Arc<ViewerRegistry>, upstream: Arc<UpstreamLink>) -> Self {
        Self {
            registry,
            upstream,
            latest: RwLock::new(None),
        }
    }

    /// The viewer registry.
    pub fn registry(&self) -> &Arc<ViewerRegistry> {
        &self.registry
    }

    /// The upstream link.
    pub fn upstream(&self) -> &Arc<UpstreamLink> {
        &self.upstream
    }

    /// Most recent upstream payload, if one has arrived.
    pub fn latest(&self) -> Option<RelayMessage> {
        self.latest.read().clone()
    }

    /// Fan an upstream payload out to every viewer.
    pub async fn on_upstream_message(&self, payload: RelayMessage) -> BroadcastReport {
        *self.latest.write() = Some(payload.clone());
        self.registry.broadcast(payload).await
    }

    /// Forward a viewer's payload upstream.
    ///
    /// `NotConnected` is returned for observability only; the viewer is
    /// never told.
    pub fn on_viewer_message(&self, viewer: ViewerId, payload: RelayMessage) -> Result<()> {
        let kind = payload.kind();
        match self.upstream.send(payload) {
            Ok(()) => {
                counter!(VIEWER_COMMANDS_TOTAL).increment(1);
                debug!(viewer_id = %viewer, kind, "forwarded viewer payload upstream");
                Ok(())
            }
            Err(e @ RelayError::NotConnected) => {
                counter!(VIEWER_COMMANDS_DROPPED_TOTAL).increment(1);
                debug!(viewer_id = %viewer, kind, "upstream down, viewer payload dropped");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Register a newly connected viewer.
    pub async fn on_viewer_connect(&self, viewer: Arc<ViewerConnection>) {
        let id = viewer.id;
        self.registry.add(viewer).await;
        info!(viewer_id = %id, "viewer connected");
    }

    /// Unregister a viewer. Safe to call more than once.
    pub async fn on_viewer_disconnect(&self, viewer: ViewerId) {
        if self.registry.remove(viewer).await {
            info!(viewer_id = %viewer, "viewer disconnected");
        }
    }
}

#[async_trait]
impl InboundHandler for RelayRouter {
    async fn handle_inbound(&self, payload: RelayMessage) {
        let _ = self.on_upstream_message(payload).await;
    }
}
