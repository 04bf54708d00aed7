//! # plunger-relay
//!
//! Relay core: one persistent upstream WebSocket link, a reconnect
//! supervisor that keeps it alive, and fan-out of upstream payloads to every
//! connected viewer.
//!
//! - [`upstream`]: the link handle, transport traits, and reconnect loop
//! - [`viewer`]: viewer connection state and the registry used for fan-out
//! - [`router`]: glue between the two directions of traffic
//! - [`relay`]: assembles the pieces and starts the supervisor
//!
//! Payloads are opaque [`RelayMessage`]s; nothing here parses sensor data.

#![deny(unsafe_code)]

pub mod errors;
pub mod message;
pub mod metrics;
pub mod relay;
pub mod router;
pub mod upstream;
pub mod viewer;

pub use errors::{CloseReason, RelayError, Result, SendFailure};
pub use message::RelayMessage;
pub use relay::{Relay, RelayHandle};
pub use router::RelayRouter;
pub use upstream::link::{LinkState, UpstreamLink};
pub use upstream::supervisor::{
    DEFAULT_RETRY_DELAY, InboundHandler, ReconnectSupervisor, SupervisorState,
};
pub use upstream::transport::{
    UpstreamConnector, UpstreamEvent, UpstreamTransport, WsConnector, WsTransport,
};
pub use viewer::connection::{ViewerConnection, ViewerId, ViewerSummary};
pub use viewer::registry::{BroadcastReport, ViewerRegistry};
