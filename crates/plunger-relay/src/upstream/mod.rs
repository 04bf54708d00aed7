//! Upstream side of the relay.
//!
//! - [`link`]: shared handle with liveness and `send`
//! - [`transport`]: connector/transport traits and the WebSocket client
//! - [`supervisor`]: the reconnect loop

#[cfg(test)]
pub(crate) mod fake;
pub mod link;
pub mod supervisor;
pub mod transport;
