//! In-memory network for tests.
//!
//! Each [DummyNetwork] is an owned instance, so several simulated rings can live in one
//! test process without sharing state. Nodes register under an address; a killed
//! address fails every request as if the process were gone, a delayed one answers
//! late.

use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::DashSet;

use super::RequestHandler;
use super::Transport;
use crate::error::Error;
use crate::error::Result;
use crate::message::Message;

/// In-memory message router between simulated nodes.
#[derive(Default)]
pub struct DummyNetwork {
    handlers: DashMap<String, Weak<dyn RequestHandler>>,
    down: DashSet<String>,
    delays: DashMap<String, Duration>,
}

impl DummyNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a node to `address`, replacing any previous one.
    pub fn register(&self, address: &str, handler: Weak<dyn RequestHandler>) {
        self.handlers.insert(address.to_string(), handler);
        self.down.remove(address);
    }

    /// Make `address` unreachable.
    pub fn kill(&self, address: &str) {
        tracing::info!("dummy network: kill {}", address);
        self.down.insert(address.to_string());
    }

    /// Make `address` reachable again.
    pub fn revive(&self, address: &str) {
        tracing::info!("dummy network: revive {}", address);
        self.down.remove(address);
    }

    /// Hold every message to `address` for `delay` before delivering it.
    /// A delay longer than the rpc timeout makes the node hang.
    pub fn delay(&self, address: &str, delay: Duration) {
        tracing::info!("dummy network: delay {} by {:?}", address, delay);
        self.delays.insert(address.to_string(), delay);
    }

    /// Deliver messages to `address` right away again.
    pub fn undelay(&self, address: &str) {
        self.delays.remove(address);
    }

    async fn lag(&self, address: &str) {
        let delay = self.delays.get(address).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn handler(&self, address: &str) -> Result<Arc<dyn RequestHandler>> {
        if self.down.contains(address) {
            return Err(Error::PeerUnreachable(address.to_string()));
        }
        self.handlers
            .get(address)
            .and_then(|h| h.upgrade())
            .ok_or_else(|| Error::PeerUnreachable(address.to_string()))
    }

    /// Messages cross the network as bytes, like they would on a real wire.
    fn wire(msg: &Message) -> Result<Message> {
        let bytes = bincode::serialize(msg).map_err(Error::BincodeSerialize)?;
        bincode::deserialize(&bytes).map_err(Error::BincodeDeserialize)
    }
}

#[async_trait]
impl Transport for DummyNetwork {
    async fn request(&self, address: &str, msg: Message) -> Result<Message> {
        self.lag(address).await;
        let handler = self.handler(address)?;
        let reply = handler.on_request(Self::wire(&msg)?).await?;
        Self::wire(&reply)
    }

    async fn send(&self, address: &str, msg: Message) -> Result<()> {
        self.lag(address).await;
        let handler = self.handler(address)?;
        handler.on_message(Self::wire(&msg)?).await;
        Ok(())
    }
}
