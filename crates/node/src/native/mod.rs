//! Process-level pieces of a node: configuration and the TCP transport.
pub mod config;
pub mod transport;
