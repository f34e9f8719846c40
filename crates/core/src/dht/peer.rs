//! Peers known by a node.
use serde::Deserialize;
use serde::Serialize;

use super::did::NodeId;

/// A peer on the ring, as believed by the local node.
/// `alive` is advisory: it flips to false on a failed call and back to true
/// on the next successful contact.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub address: String,
    pub alive: bool,
}

impl NodeInfo {
    pub fn new(id: NodeId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            alive: true,
        }
    }
}

impl PartialEq for NodeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::hash::Hash for NodeInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl std::fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Node({}, {})", self.id, self.address)
    }
}
