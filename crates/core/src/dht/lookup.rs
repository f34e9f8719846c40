//! Strategies to answer "who owns this id".
//!
//! A node either knows the whole ring and scans it ([FullRingLookup]), or knows
//! O(log n) fingers and walks the ring hop by hop ([FingerLookup]). The quorum
//! coordinator only sees [SuccessorLookup].
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use super::chord::PeerRingAction;
use super::chord::RemoteAction;
use super::types::Chord;
use super::NodeId;
use super::NodeInfo;
use super::PeerRing;
use super::TopoInfo;
use crate::consts::MAX_LOOKUP_HOPS;
use crate::error::Error;
use crate::error::Result;
use crate::message::FindSuccessorReport;
use crate::message::FindSuccessorSend;
use crate::message::Message;
use crate::message::QueryForTopoInfoSend;
use crate::swarm::transport::SwarmTransport;

/// Which lookup strategy a node runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Routing {
    /// Scan every known peer.
    #[default]
    Full,
    /// Route through the finger table.
    Finger,
}

/// Lookup strategy interface.
#[async_trait]
pub trait SuccessorLookup: Send + Sync {
    /// The alive node that owns `id` under the current view.
    async fn find_successor(&self, id: NodeId) -> Result<NodeInfo>;

    /// Up to `count` nodes clockwise from the owner point of `id`, with the
    /// local liveness belief about each.
    async fn walk(&self, id: NodeId, count: usize) -> Result<Vec<NodeInfo>>;
}

/// Full-ring knowledge: a direct scan of the peer table.
pub struct FullRingLookup {
    dht: Arc<PeerRing>,
}

impl FullRingLookup {
    pub fn new(dht: Arc<PeerRing>) -> Self {
        Self { dht }
    }
}

#[async_trait]
impl SuccessorLookup for FullRingLookup {
    async fn find_successor(&self, id: NodeId) -> Result<NodeInfo> {
        self.dht.owner_of(id)
    }

    async fn walk(&self, id: NodeId, count: usize) -> Result<Vec<NodeInfo>> {
        self.dht.walk(id, count)
    }
}

/// Finger-table routing: ask the closest preceding finger, which answers or
/// points to a closer node, until the owner is found.
pub struct FingerLookup {
    transport: Arc<SwarmTransport>,
}

impl FingerLookup {
    pub fn new(transport: Arc<SwarmTransport>) -> Self {
        Self { transport }
    }

    fn dht(&self) -> &PeerRing {
        &self.transport.dht
    }

    fn resolve(&self, id: NodeId) -> Result<NodeInfo> {
        self.dht()
            .peer(id)?
            .ok_or(Error::PeerUnreachable(id.to_string()))
    }

    async fn topo_info(&self, node: &NodeInfo) -> Result<TopoInfo> {
        if node.id == self.dht().id {
            return TopoInfo::try_from(self.dht());
        }
        match self
            .transport
            .request(node, QueryForTopoInfoSend.into())
            .await?
        {
            Message::QueryForTopoInfoReport(r) => Ok(r.info),
            _ => Err(Error::InvalidMessage("QueryForTopoInfoReport")),
        }
    }
}

#[async_trait]
impl SuccessorLookup for FingerLookup {
    async fn find_successor(&self, id: NodeId) -> Result<NodeInfo> {
        let mut hop = match self.dht().find_successor(id)? {
            PeerRingAction::Some(n) => return self.resolve(n),
            PeerRingAction::RemoteAction(next, RemoteAction::FindSuccessor(_)) => {
                self.resolve(next)?
            }
            _ => return Err(Error::InvalidMessage("FindSuccessor action")),
        };

        for _ in 0..MAX_LOOKUP_HOPS {
            tracing::debug!("finger lookup of {} asks {}", id, hop);
            let reply = self
                .transport
                .request(&hop, FindSuccessorSend { id }.into())
                .await;
            hop = match reply {
                Ok(Message::FindSuccessorReport(FindSuccessorReport {
                    node: Some(owner), ..
                })) => return Ok(owner),
                Ok(Message::FindSuccessorReport(FindSuccessorReport {
                    next: Some(next), ..
                })) => next,
                Ok(_) => return Err(Error::InvalidMessage("FindSuccessorReport")),
                // The hop is now marked dead, restart from the repaired local view.
                Err(_) => match self.dht().find_successor(id)? {
                    PeerRingAction::Some(n) => return self.resolve(n),
                    PeerRingAction::RemoteAction(next, _) => self.resolve(next)?,
                    _ => return Err(Error::InvalidMessage("FindSuccessor action")),
                },
            };
        }
        Err(Error::LookupHopsExceeded(id.as_u64()))
    }

    async fn walk(&self, id: NodeId, count: usize) -> Result<Vec<NodeInfo>> {
        let owner = self.find_successor(id).await?;
        let info = self.topo_info(&owner).await?;

        let mut nodes = vec![owner];
        for n in info.successors {
            if nodes.iter().any(|x| x.id == n.id) {
                continue;
            }
            let alive = self.dht().is_alive(n.id)?;
            nodes.push(NodeInfo { alive, ..n });
        }
        // The owner only reports live successors. Peers this node knows, dead
        // ones included, fill in natural replicas that left and spares for them.
        for p in self.dht().peers()? {
            if !nodes.iter().any(|x| x.id == p.id) {
                nodes.push(p);
            }
        }
        nodes.sort_by_key(|p| self.dht().space.distance(id, p.id));
        nodes.truncate(count);
        Ok(nodes)
    }
}
