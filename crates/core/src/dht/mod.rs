//! Implementation of the ring, which is based on CHORD, ref: <https://pdos.csail.mit.edu/papers/ton:chord/paper-ton.pdf>
//! With high probability, the number of nodes that must be contacted to find a successor in an N-node network is O(log N).

mod chord;
pub mod did;
/// Finger table of a node
pub mod finger;
/// Lookup strategies
pub mod lookup;
/// Peers known by a node
pub mod peer;
/// Replica placement
pub mod replica;
mod stabilization;
pub mod successor;
/// Chord traits
pub mod types;

pub use chord::PeerRing;
pub use chord::PeerRingAction;
pub use chord::RemoteAction as PeerRingRemoteAction;
pub use chord::TopoInfo;
pub use did::IdSpace;
pub use did::NodeId;
pub use finger::FingerTable;
pub use lookup::FingerLookup;
pub use lookup::FullRingLookup;
pub use lookup::Routing;
pub use lookup::SuccessorLookup;
pub use peer::NodeInfo;
pub use replica::ReplicaSet;
pub use replica::ReplicaTarget;
pub use stabilization::Stabilizer;
pub use successor::SuccessorReader;
pub use successor::SuccessorWriter;
pub use types::Chord;
