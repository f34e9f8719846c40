//! The seam between the core and whatever carries messages between nodes.
//!
//! The core only needs two primitives: a request that expects one reply, and a
//! fire-and-forget message. Timeouts are applied by the caller, see
//! [crate::swarm::transport::SwarmTransport].

#[cfg(any(test, feature = "dummy"))]
pub mod dummy;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::Message;

/// Outbound side of a transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `msg` to `address` and wait for the reply.
    async fn request(&self, address: &str, msg: Message) -> Result<Message>;

    /// Send `msg` to `address` without waiting for any reply.
    async fn send(&self, address: &str, msg: Message) -> Result<()>;
}

/// Inbound side: what a transport calls when a message arrives.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Serve a request and produce its reply.
    async fn on_request(&self, msg: Message) -> Result<Message>;

    /// Consume a fire-and-forget message.
    async fn on_message(&self, msg: Message);
}

/// Shared transport handle.
pub type SharedTransport = Arc<dyn Transport>;
