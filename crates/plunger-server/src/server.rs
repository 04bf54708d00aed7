//! `RelayServer`: Axum HTTP + WebSocket listener for viewers.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use plunger_relay::{RelayRouter, SupervisorState, ViewerId};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::websocket::session::run_viewer_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay router; viewers are registered and commands forwarded here.
    pub router: Arc<RelayRouter>,
    /// Upstream supervisor state.
    pub supervisor: watch::Receiver<SupervisorState>,
    /// Listener configuration.
    pub config: Arc<ServerConfig>,
    /// Process-wide shutdown signal.
    pub cancel: CancellationToken,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The viewer-facing server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    router: Arc<RelayRouter>,
    supervisor: watch::Receiver<SupervisorState>,
    cancel: CancellationToken,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl RelayServer {
    /// Create a server over a running relay.
    ///
    /// `cancel` is the token the relay supervisor watches; cancelling it
    /// stops the listener, every viewer session, and the upstream link.
    pub fn new(
        config: ServerConfig,
        router: Arc<RelayRouter>,
        supervisor: watch::Receiver<SupervisorState>,
        cancel: CancellationToken,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            router,
            supervisor,
            cancel,
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            router: Arc::clone(&self.router),
            supervisor: self.supervisor.clone(),
            config: Arc::clone(&self.config),
            cancel: self.cancel.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/api/status", get(api::status_handler))
            .route("/api/sensors", get(api::sensors_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve until the shutdown token is cancelled.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.cancel.clone();

        info!(%addr, "listening for viewers");
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "http server failed");
            }
            info!("http server stopped");
        });
        Ok((addr, handle))
    }

}

/// GET /ws
///
/// Shutdown is checked before the upgrade headers so a closing server
/// always answers 503.
async fn ws_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.cancel.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let viewer_id = ViewerId::new();
    let router = Arc::clone(&state.router);
    let config = Arc::clone(&state.config);
    let cancel = state.cancel.clone();
    ws.on_upgrade(move |socket| run_viewer_session(socket, viewer_id, router, config, cancel))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let viewers = state.router.registry().connection_count().await;
    let upstream = state.router.upstream().state();
    Json(health::health_check(state.start_time, viewers, upstream))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
