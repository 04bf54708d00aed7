//! Metric names recorded by the relay.
//!
//! Recording goes through the `metrics` facade; the server crate installs the
//! Prometheus recorder that renders them.

/// Viewer WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Viewer WebSocket disconnections (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active viewer WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Viewers disconnected because their outbound queue was full (counter).
pub const WS_SLOW_VIEWER_EVICTIONS_TOTAL: &str = "ws_slow_viewer_evictions_total";
/// Viewer connection lifetime (histogram, seconds).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Upstream connect attempts (counter).
pub const UPSTREAM_CONNECT_ATTEMPTS_TOTAL: &str = "upstream_connect_attempts_total";
/// Upstream link state, 1 = connected, 0 = not (gauge).
pub const UPSTREAM_CONNECTED: &str = "upstream_connected";
/// Payloads received from upstream (counter).
pub const UPSTREAM_MESSAGES_TOTAL: &str = "upstream_messages_total";
/// Viewer commands forwarded upstream (counter).
pub const VIEWER_COMMANDS_TOTAL: &str = "viewer_commands_total";
/// Viewer commands dropped because upstream was down (counter).
pub const VIEWER_COMMANDS_DROPPED_TOTAL: &str = "viewer_commands_dropped_total";
