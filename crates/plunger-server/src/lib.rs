//! # plunger-server
//!
//! Axum HTTP + `WebSocket` listener for dashboard viewers.
//!
//! - `GET /ws`: viewer sessions wired into the relay router
//! - `GET /health`, `/api/status`, `/api/sensors`: read-only JSON views
//! - `GET /metrics`: Prometheus exposition
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, RelayServer};
