//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may contain any subset of fields; missing fields get their default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "upstream": { "host": "192.168.1.40", "port": 8765 },
///   "server": { "port": 3000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlungerSettings {
    /// Remote device-control service the relay mirrors.
    pub upstream: UpstreamSettings,
    /// Local HTTP/WebSocket listener for viewers.
    pub server: ServerSettings,
    /// Log output configuration.
    pub logging: LoggingSettings,
}

impl PlungerSettings {
    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        let upstream = &self.upstream;
        let server = &self.server;
        check(!upstream.host.trim().is_empty(), "upstream.host", || "must not be empty".into())?;
        check(upstream.port > 0, "upstream.port", || "must be > 0".into())?;
        check(upstream.path.starts_with('/'), "upstream.path", || {
            format!("must start with '/', got {:?}", upstream.path)
        })?;
        check(upstream.retry_delay_ms > 0, "upstream.retryDelayMs", || "must be > 0".into())?;
        check(server.viewer_queue_capacity > 0, "server.viewerQueueCapacity", || {
            "must be > 0".into()
        })?;
        check(server.heartbeat_interval_secs > 0, "server.heartbeatIntervalSecs", || {
            "must be > 0".into()
        })?;
        check(
            server.heartbeat_timeout_secs >= server.heartbeat_interval_secs,
            "server.heartbeatTimeoutSecs",
            || "must be >= server.heartbeatIntervalSecs".into(),
        )
    }
}

fn check(ok: bool, field: &'static str, reason: impl FnOnce() -> String) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(SettingsError::Invalid {
            field,
            reason: reason(),
        })
    }
}

/// Upstream status-stream connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamSettings {
    /// Host of the device-control service.
    pub host: String,
    /// Port of the device-control service.
    pub port: u16,
    /// WebSocket path on the device-control service.
    pub path: String,
    /// Fixed delay between reconnect attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

impl UpstreamSettings {
    /// WebSocket URL the relay connects to.
    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.path)
    }

    /// Reconnect delay as a [`Duration`].
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            path: "/ws".to_string(),
            retry_delay_ms: 5_000,
        }
    }
}

/// Viewer-facing listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Interval between server-initiated Ping frames to viewers.
    pub heartbeat_interval_secs: u64,
    /// Close a viewer that has not answered a Ping for this long.
    pub heartbeat_timeout_secs: u64,
    /// Per-viewer outbound queue depth before messages are dropped.
    pub viewer_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            viewer_queue_capacity: 256,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
