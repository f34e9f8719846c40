//! A ring node: membership, the quorum coordinator and the inbound message handler.

mod builder;
/// Outbound calls with liveness bookkeeping
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
pub use builder::SwarmBuilder;
use futures_timer::Delay;

use crate::consistency::ConsistencyLevel;
use crate::consistency::Coordinator;
use crate::consistency::QuorumConfig;
use crate::consistency::Versioned;
use crate::consistency::VersionVector;
use crate::consts::JOIN_RETRY_DELAY_MS;
use crate::consts::MAX_LOOKUP_HOPS;
use crate::dht::Chord;
use crate::dht::NodeId;
use crate::dht::NodeInfo;
use crate::dht::PeerRing;
use crate::dht::Routing;
use crate::dht::Stabilizer;
use crate::dht::SuccessorLookup;
use crate::error::Error;
use crate::error::Result;
use crate::inspect::RingSnapshot;
use crate::message::ErrorReport;
use crate::message::FindSuccessorReport;
use crate::message::FindSuccessorSend;
use crate::message::JoinDHT;
use crate::message::Message;
use crate::message::MessageHandler;
use crate::message::QueryForAllNodesSend;
use crate::message::QueryForTopoInfoSend;
use crate::storage::KeyListing;
use crate::storage::RecordStore;
use crate::swarm::transport::SwarmTransport;
use crate::transport::RequestHandler;

/// The transport and dht management.
pub struct Swarm {
    /// Reference of DHT.
    pub(crate) dht: Arc<PeerRing>,
    pub(crate) transport: Arc<SwarmTransport>,
    storage: Arc<RecordStore>,
    coordinator: Coordinator,
    message_handler: MessageHandler,
    stabilizer: Arc<Stabilizer>,
    lookup: Arc<dyn SuccessorLookup>,
    routing: Routing,
    join_retries: u8,
}

impl Swarm {
    /// Get id of self.
    pub fn id(&self) -> NodeId {
        self.dht.id
    }

    /// Get DHT(Distributed Hash Table) of self.
    pub fn dht(&self) -> Arc<PeerRing> {
        self.dht.clone()
    }

    /// Record store of this node.
    pub fn storage(&self) -> Arc<RecordStore> {
        self.storage.clone()
    }

    pub fn quorum(&self) -> QuorumConfig {
        self.coordinator.config()
    }

    pub fn consistency_level(&self) -> ConsistencyLevel {
        self.coordinator.config().consistency_level()
    }

    /// The stabilization runner of this node, see [Stabilizer::wait].
    pub fn stabilizer(&self) -> Arc<Stabilizer> {
        self.stabilizer.clone()
    }

    /// Enter the ring. Without a bootstrap address the node forms a singleton ring.
    /// Otherwise the bootstrap is asked for the successor of this node's id, which
    /// becomes the initial successor; the predecessor is left to stabilization.
    pub async fn join(&self, bootstrap: Option<&str>) -> Result<()> {
        let Some(bootstrap) = bootstrap else {
            self.dht.init_singleton()?;
            tracing::info!("{} created a new ring", self.dht.info());
            return Ok(());
        };

        let attempts = self.join_retries.max(1);
        for attempt in 1..=attempts {
            match self.join_via(bootstrap).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        "join via {} failed (attempt {}/{}): {}",
                        bootstrap,
                        attempt,
                        attempts,
                        e
                    );
                    if attempt < attempts {
                        Delay::new(Duration::from_millis(JOIN_RETRY_DELAY_MS)).await;
                    }
                }
            }
        }
        Err(Error::UnreachableBootstrap(bootstrap.to_string()))
    }

    async fn join_via(&self, bootstrap: &str) -> Result<()> {
        let mut successor = self.locate_successor(bootstrap, self.dht.id).await?;
        if successor.id == self.dht.id {
            // The ring still lists a previous incarnation of this node.
            let next = self.dht.space.id(self.dht.id.as_u64().wrapping_add(1));
            successor = self.locate_successor(bootstrap, next).await?;
        }
        tracing::info!("{} joins the ring before {}", self.dht.id, successor);
        self.dht.join(successor.clone())?;

        let known = match self.routing {
            Routing::Full => {
                match self
                    .transport
                    .request_address(bootstrap, QueryForAllNodesSend.into())
                    .await?
                {
                    Message::AllNodesReport(r) => r.nodes,
                    _ => return Err(Error::InvalidMessage("AllNodesReport")),
                }
            }
            Routing::Finger => {
                match self
                    .transport
                    .request(&successor, QueryForTopoInfoSend.into())
                    .await?
                {
                    Message::QueryForTopoInfoReport(r) => r.info.successors,
                    _ => return Err(Error::InvalidMessage("QueryForTopoInfoReport")),
                }
            }
        };
        for node in known {
            if node.id != self.dht.id && node.alive {
                self.dht.join(node)?;
            }
        }

        let announce = match self.routing {
            Routing::Full => self.dht.peers()?,
            Routing::Finger => vec![self.dht.successor()?],
        };
        let msg: Message = JoinDHT {
            node: self.dht.info(),
        }
        .into();
        for peer in announce.iter().filter(|p| p.id != self.dht.id && p.alive) {
            if let Err(e) = self.transport.send(peer, msg.clone()).await {
                tracing::warn!("failed to announce join to {}: {}", peer, e);
            }
        }
        Ok(())
    }

    /// Follow find-successor hops starting at an address this node may not know yet.
    async fn locate_successor(&self, bootstrap: &str, id: NodeId) -> Result<NodeInfo> {
        let mut address = bootstrap.to_string();
        for _ in 0..MAX_LOOKUP_HOPS {
            match self
                .transport
                .request_address(&address, FindSuccessorSend { id }.into())
                .await?
            {
                Message::FindSuccessorReport(FindSuccessorReport {
                    node: Some(owner), ..
                }) => return Ok(owner),
                Message::FindSuccessorReport(FindSuccessorReport {
                    next: Some(next), ..
                }) => address = next.address,
                _ => return Err(Error::InvalidMessage("FindSuccessorReport")),
            }
        }
        Err(Error::LookupHopsExceeded(id.as_u64()))
    }

    /// The alive node owning `id`, through the configured routing.
    pub async fn find_successor(&self, id: NodeId) -> Result<NodeInfo> {
        self.lookup.find_successor(id).await
    }

    /// Quorum write of `key`. The new version supersedes whatever the replicas hold.
    pub async fn put(&self, key: &str, value: &str) -> Result<VersionVector> {
        self.coordinator.put(key, value, None).await
    }

    /// Quorum write of `key` descending from `version`, typically the version
    /// returned by an earlier [Swarm::get].
    pub async fn put_with_version(
        &self,
        key: &str,
        value: &str,
        version: VersionVector,
    ) -> Result<VersionVector> {
        self.coordinator.put(key, value, Some(version)).await
    }

    /// Quorum read of `key`.
    pub async fn get(&self, key: &str) -> Result<Versioned> {
        self.coordinator.get(key).await
    }

    /// What this node currently believes about the ring.
    pub fn ring_snapshot(&self) -> Result<RingSnapshot> {
        RingSnapshot::inspect(&self.dht)
    }

    /// Keys stored on this node, grouped by role.
    pub async fn list_keys(&self) -> Result<KeyListing> {
        self.storage.list_keys().await
    }
}

#[async_trait]
impl RequestHandler for Swarm {
    async fn on_request(&self, msg: Message) -> Result<Message> {
        match self.message_handler.handle_message(&msg).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                tracing::warn!("[{}] failed to handle {}: {}", self.dht.id, msg, e);
                Ok(ErrorReport {
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    async fn on_message(&self, msg: Message) {
        if let Err(e) = self.message_handler.handle_message(&msg).await {
            tracing::error!("[{}] failed to handle {}: {}", self.dht.id, msg, e);
        }
    }
}
