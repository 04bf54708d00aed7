//! Assembly of the relay components.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::router::RelayRouter;
use crate::upstream::link::UpstreamLink;
use crate::upstream::supervisor::{InboundHandler, ReconnectSupervisor, SupervisorState};
use crate::upstream::transport::UpstreamConnector;
use crate::viewer::registry::ViewerRegistry;

/// A relay that has been wired but not started.
pub struct Relay {
    router: Arc<RelayRouter>,
    supervisor: ReconnectSupervisor,
}

impl Relay {
    /// Wire a link to `url`, a viewer registry, and a router.
    pub fn new(
        url: impl Into<String>,
        retry_delay: Duration,
        connector: Arc<dyn UpstreamConnector>,
    ) -> Self {
        let link = Arc::new(UpstreamLink::new(url));
        let registry = Arc::new(ViewerRegistry::new());
        let router = Arc::new(RelayRouter::new(registry, Arc::clone(&link)));
        let supervisor = ReconnectSupervisor::new(
            link,
            connector,
            Arc::clone(&router) as Arc<dyn InboundHandler>,
            retry_delay,
        );
        Self { router, supervisor }
    }

    /// The router, available before the supervisor starts.
    pub fn router(&self) -> &Arc<RelayRouter> {
        &self.router
    }

    /// Spawn the reconnect supervisor.
    pub fn start(self, cancel: CancellationToken) -> RelayHandle {
        let state = self.supervisor.subscribe();
        let task = tokio::spawn(self.supervisor.run(cancel));
        RelayHandle {
            router: self.router,
            state,
            task,
        }
    }
}

/// A running relay.
pub struct RelayHandle {
    /// Router shared with the viewer-facing server.
    pub router: Arc<RelayRouter>,
    /// Supervisor state updates.
    pub state: watch::Receiver<SupervisorState>,
    /// The supervisor task; completes after cancellation.
    pub task: JoinHandle<()>,
}
