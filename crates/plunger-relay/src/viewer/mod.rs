//! Downstream viewers.

pub mod connection;
pub mod registry;
