//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use plunger_relay::LinkState;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Connected viewers.
    pub viewers: usize,
    /// Upstream link state.
    pub upstream: LinkState,
}

/// Build a health response from live counters.
///
/// The server is healthy whether or not upstream is reachable; the link
/// state is reported, not judged.
pub fn health_check(start_time: Instant, viewers: usize, upstream: LinkState) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        viewers,
        upstream,
    }
}
