//! Point-in-time views of a node for diagnostics.
use serde::Deserialize;
use serde::Serialize;

use crate::dht::NodeId;
use crate::dht::NodeInfo;
use crate::dht::PeerRing;
use crate::dht::SuccessorReader;
use crate::error::Result;

/// What a node currently believes about the ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingSnapshot {
    pub self_id: NodeId,
    pub address: String,
    #[serde(default)]
    pub predecessor: Option<NodeInfo>,
    pub successor: NodeInfo,
    pub successors: Vec<NodeInfo>,
    pub finger_table: Vec<Option<NodeId>>,
    pub all_known_nodes: Vec<NodeInfo>,
}

impl RingSnapshot {
    pub fn inspect(dht: &PeerRing) -> Result<Self> {
        let successors = dht
            .successors()
            .list()?
            .into_iter()
            .map(|id| {
                dht.peer(id)
                    .map(|p| p.unwrap_or_else(|| NodeInfo::new(id, String::new())))
            })
            .collect::<Result<Vec<_>>>()?;
        let finger_table = dht.lock_finger()?.list().clone();
        Ok(Self {
            self_id: dht.id,
            address: dht.address.clone(),
            predecessor: dht.predecessor()?,
            successor: dht.successor()?,
            successors,
            finger_table,
            all_known_nodes: dht.peers()?,
        })
    }
}
