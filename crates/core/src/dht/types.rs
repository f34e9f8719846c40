//! Traits of the Chord protocol.
use crate::dht::peer::NodeInfo;
use crate::dht::NodeId;
use crate::error::Result;

/// Chord is a distributed hash table (DHT) algorithm that provides a way to efficiently
/// find the node responsible for a key. Every method is a local step; when a step
/// needs another node it returns an `Action` that the caller carries out remotely.
pub trait Chord<Action> {
    /// Learn about a node, usually on join announcement or first contact.
    fn join(&self, node: NodeInfo) -> Result<Action>;

    /// Find the successor of an id, possibly delegating to a closer node.
    fn find_successor(&self, id: NodeId) -> Result<Action>;

    /// Handle a predecessor candidate. Returns the predecessor after the update.
    fn notify(&self, id: NodeId) -> Result<NodeId>;
}
