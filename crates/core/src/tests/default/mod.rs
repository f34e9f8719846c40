use std::sync::Arc;
use std::time::Duration;

use crate::consistency::QuorumConfig;
use crate::dht::IdSpace;
use crate::dht::NodeId;
use crate::dht::Routing;
use crate::dht::SuccessorReader;
use crate::error::Result;
use crate::storage::record_key;
use crate::storage::KvStorageInterface;
use crate::storage::MemStorage;
use crate::storage::Record;
use crate::swarm::Swarm;
use crate::swarm::SwarmBuilder;
use crate::transport::dummy::DummyNetwork;
use crate::transport::RequestHandler;

mod test_handoff;
mod test_quorum;
mod test_stabilization;

pub const BITS: u8 = 8;

pub struct Node {
    pub swarm: Arc<Swarm>,
    /// Shared with the swarm; survives a simulated restart.
    pub storage: MemStorage<Record>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.swarm.id()
    }

    /// The node's own copy of `key`, read straight from its storage.
    pub async fn stored(&self, key: &str) -> Option<Record> {
        self.storage.get(&record_key(key)).await.unwrap()
    }
}

pub fn space() -> IdSpace {
    IdSpace::new(BITS).unwrap()
}

pub fn address(id: u64) -> String {
    format!("node-{}", id)
}

pub fn prepare_node(
    net: &Arc<DummyNetwork>,
    id: u64,
    routing: Routing,
    quorum: QuorumConfig,
    storage: MemStorage<Record>,
) -> Node {
    let swarm = SwarmBuilder::new(&address(id), Box::new(storage.clone()), net.clone())
        .id(NodeId::new(id))
        .space(space())
        .quorum(quorum)
        .routing(routing)
        .rpc_timeout(Duration::from_millis(500))
        .join_retries(1)
        .build()
        .unwrap();
    let handler: Arc<dyn RequestHandler> = swarm.clone();
    net.register(&address(id), Arc::downgrade(&handler));
    Node { swarm, storage }
}

/// Nodes joined in the given order, the first one creating the ring.
pub async fn prepare_ring(
    net: &Arc<DummyNetwork>,
    ids: &[u64],
    routing: Routing,
    quorum: QuorumConfig,
) -> Result<Vec<Node>> {
    let mut nodes = vec![];
    for (i, id) in ids.iter().enumerate() {
        let node = prepare_node(net, *id, routing, quorum, MemStorage::new());
        if i == 0 {
            node.swarm.join(None).await?;
        } else {
            node.swarm.join(Some(&address(ids[0]))).await?;
        }
        nodes.push(node);
    }
    Ok(nodes)
}

/// Run `rounds` stabilization ticks on every node.
pub async fn tick(nodes: &[Node], rounds: usize) {
    for _ in 0..rounds {
        for node in nodes {
            node.swarm.stabilizer().stabilize().await.unwrap();
        }
    }
}

/// Let spawned replica calls and read repairs finish.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// A key whose hash falls in `(start, end]`.
pub fn key_in(start: u64, end: u64) -> String {
    let space = space();
    (0..)
        .map(|i| format!("key-{}", i))
        .find(|k| space.in_range(space.hash_key(k), NodeId::new(start), NodeId::new(end)))
        .unwrap()
}

/// Every node points to its clockwise neighbours in `sorted`.
pub fn assert_ring(nodes: &[Node], sorted: &[u64]) {
    let n = sorted.len();
    for node in nodes {
        let id = node.id().as_u64();
        let pos = sorted.iter().position(|x| *x == id).unwrap();
        let succ = sorted[(pos + 1) % n];
        let pred = sorted[(pos + n - 1) % n];
        let dht = node.swarm.dht();
        assert_eq!(
            dht.successors().min().unwrap().as_u64(),
            succ,
            "expect successor of {} to be {}",
            id,
            succ
        );
        assert_eq!(
            *dht.lock_predecessor().unwrap(),
            Some(NodeId::new(pred)),
            "expect predecessor of {} to be {}",
            id,
            pred
        );
    }
}
