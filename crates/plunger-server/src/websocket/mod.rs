//! Viewer `WebSocket` sessions.

pub mod session;
