//! Server configuration.

use std::time::Duration;

use plunger_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the viewer-facing server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind; `0` picks a free port.
    pub port: u16,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a viewer after this many seconds without a pong.
    pub heartbeat_timeout_secs: u64,
    /// Per-viewer outbound queue depth.
    pub viewer_queue_capacity: usize,
}

impl ServerConfig {
    /// Interval between server Ping frames.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Silence allowed before a viewer is closed.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            heartbeat_interval_secs: settings.heartbeat_interval_secs,
            heartbeat_timeout_secs: settings.heartbeat_timeout_secs,
            viewer_queue_capacity: settings.viewer_queue_capacity,
        }
    }
}
