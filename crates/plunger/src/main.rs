//! # plunger
//!
//! Dashboard relay binary: keeps one WebSocket link to the device service
//! and fans its status out to every connected viewer.

#![deny(unsafe_code)]

mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use plunger_relay::{Relay, WsConnector};
use plunger_server::{RelayServer, ServerConfig};
use plunger_settings::loader::{load_settings_from_path, parse_log_format, settings_path};
use plunger_settings::{LogFormat, PlungerSettings};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long the server and supervisor get to stop after Ctrl-C.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Plunger dashboard relay.
#[derive(Parser, Debug)]
#[command(name = "plunger", about = "Plunger dashboard relay")]
struct Cli {
    /// Settings file (default `~/.plunger/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind for viewers.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind for viewers (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Upstream device-service host.
    #[arg(long)]
    upstream_host: Option<String>,

    /// Upstream device-service port.
    #[arg(long)]
    upstream_port: Option<u16>,

    /// Upstream WebSocket path.
    #[arg(long)]
    upstream_path: Option<String>,

    /// Delay between upstream reconnect attempts, in milliseconds.
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Log level or `EnvFilter` directives.
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format (`pretty` or `json`).
    #[arg(long, value_parser = parse_format_arg)]
    log_format: Option<LogFormat>,
}

fn parse_format_arg(value: &str) -> Result<LogFormat, String> {
    parse_log_format(value).ok_or_else(|| format!("unknown log format {value:?}"))
}

impl Cli {
    /// Flags override file and environment values.
    fn apply(&self, settings: &mut PlungerSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(host) = &self.upstream_host {
            settings.upstream.host.clone_from(host);
        }
        if let Some(port) = self.upstream_port {
            settings.upstream.port = port;
        }
        if let Some(path) = &self.upstream_path {
            settings.upstream.path.clone_from(path);
        }
        if let Some(delay) = self.retry_delay_ms {
            settings.upstream.retry_delay_ms = delay;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

/// Wait for `tasks` to finish, giving up after `timeout`.
///
/// Returns `false` if some task was still running when time ran out.
async fn drain(tasks: Vec<JoinHandle<()>>, timeout: Duration) -> bool {
    tracing::info!(task_count = tasks.len(), ?timeout, "waiting for relay tasks to stop");
    let finished = tokio::time::timeout(timeout, futures::future::join_all(tasks))
        .await
        .is_ok();
    if !finished {
        tracing::warn!(?timeout, "shutdown timed out, some tasks may still be running");
    }
    finished
}

fn load(args: &Cli) -> Result<PlungerSettings> {
    let path = args.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = load(&args)?;

    telemetry::init_logging(&settings.logging).context("Failed to initialize logging")?;
    let metrics = plunger_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let shutdown = CancellationToken::new();
    let upstream_url = settings.upstream.url();
    let relay = Relay::new(
        upstream_url.clone(),
        settings.upstream.retry_delay(),
        Arc::new(WsConnector),
    );
    let relay = relay.start(shutdown.clone());

    let server = RelayServer::new(
        ServerConfig::from(&settings.server),
        Arc::clone(&relay.router),
        relay.state.clone(),
        shutdown.clone(),
        Some(metrics),
    );
    let (addr, server_handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(%addr, upstream = %upstream_url, "plunger relay listening");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    shutdown.cancel();
    let _ = drain(vec![server_handle, relay.task], SHUTDOWN_TIMEOUT).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
