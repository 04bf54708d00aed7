//! Read-only JSON endpoints.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use plunger_relay::{LinkState, RelayMessage, SupervisorState, ViewerSummary};
use serde::Serialize;
use serde_json::json;

use crate::server::AppState;

/// `/api/status` response body.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    /// Upstream URL every connect attempt targets.
    pub upstream_url: String,
    /// Link state.
    pub link: LinkState,
    /// Supervisor state.
    pub supervisor: SupervisorState,
    /// Generation of the current or most recent upstream connection.
    pub generation: u64,
    /// Most recent connect failure or close reason.
    pub last_error: Option<String>,
    /// Number of connected viewers.
    pub viewers: usize,
    /// Connected viewers, sorted by id.
    pub viewer_list: Vec<ViewerSummary>,
}

/// GET /api/status
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let link = state.router.upstream();
    let mut viewer_list: Vec<ViewerSummary> = state
        .router
        .registry()
        .connections()
        .await
        .iter()
        .map(|viewer| viewer.summary())
        .collect();
    viewer_list.sort_by_key(|viewer| viewer.id);
    Json(StatusResponse {
        upstream_url: link.target().to_owned(),
        link: link.state(),
        supervisor: *state.supervisor.borrow(),
        generation: link.generation(),
        last_error: link.last_error(),
        viewers: viewer_list.len(),
        viewer_list,
    })
}

/// GET /api/sensors
///
/// Serves the latest upstream payload as-is. 503 until the first one arrives.
pub async fn sensors_handler(State(state): State<AppState>) -> Response {
    match state.router.latest() {
        Some(RelayMessage::Text(text)) => {
            ([(header::CONTENT_TYPE, "application/json")], text).into_response()
        }
        Some(RelayMessage::Binary(data)) => {
            ([(header::CONTENT_TYPE, "application/octet-stream")], data).into_response()
        }
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "no status received yet" })),
        )
            .into_response(),
    }
}
