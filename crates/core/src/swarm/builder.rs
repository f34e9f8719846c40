//! This module provider [SwarmBuilder] and it's interface for
//! [Swarm]

use std::sync::Arc;
use std::time::Duration;

use crate::consistency::Coordinator;
use crate::consistency::HintedHandoff;
use crate::consistency::QuorumConfig;
use crate::consts::DEFAULT_JOIN_RETRIES;
use crate::consts::DEFAULT_RPC_TIMEOUT_MS;
use crate::dht::FingerLookup;
use crate::dht::FullRingLookup;
use crate::dht::IdSpace;
use crate::dht::NodeId;
use crate::dht::PeerRing;
use crate::dht::Routing;
use crate::dht::Stabilizer;
use crate::dht::SuccessorLookup;
use crate::error::Result;
use crate::message::MessageHandler;
use crate::storage::RecordStorage;
use crate::storage::RecordStore;
use crate::swarm::transport::SwarmTransport;
use crate::swarm::Swarm;
use crate::transport::SharedTransport;

/// Creates a SwarmBuilder to configure a Swarm.
pub struct SwarmBuilder {
    address: String,
    id: Option<NodeId>,
    space: IdSpace,
    quorum: QuorumConfig,
    rpc_timeout: Duration,
    routing: Routing,
    join_retries: u8,
    storage: RecordStorage,
    transport: SharedTransport,
}

impl SwarmBuilder {
    /// Creates new instance of [SwarmBuilder]
    pub fn new(address: &str, storage: RecordStorage, transport: SharedTransport) -> Self {
        SwarmBuilder {
            address: address.to_string(),
            id: None,
            space: IdSpace::default(),
            quorum: QuorumConfig::default(),
            rpc_timeout: Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS),
            routing: Routing::default(),
            join_retries: DEFAULT_JOIN_RETRIES,
            storage,
            transport,
        }
    }

    /// Pin the node id instead of hashing the address.
    pub fn id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets up the identifier space.
    pub fn space(mut self, space: IdSpace) -> Self {
        self.space = space;
        self
    }

    /// Sets up N, R and W.
    pub fn quorum(mut self, quorum: QuorumConfig) -> Self {
        self.quorum = quorum;
        self
    }

    /// Bound of every outbound call.
    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn routing(mut self, routing: Routing) -> Self {
        self.routing = routing;
        self
    }

    pub fn join_retries(mut self, retries: u8) -> Self {
        self.join_retries = retries;
        self
    }

    /// Try build for `Swarm`.
    pub fn build(self) -> Result<Arc<Swarm>> {
        self.quorum.validate()?;
        let id = match self.id {
            Some(id) => self.space.id(id.as_u64()),
            None => self.space.hash_address(&self.address),
        };
        // The successor list backs the N-1 failover replicas.
        let succ_max = self.quorum.n.saturating_sub(1).max(1);
        let dht = Arc::new(PeerRing::new(id, self.address, self.space, succ_max));

        let transport = Arc::new(SwarmTransport::new(
            self.transport,
            dht.clone(),
            self.rpc_timeout,
        ));
        let lookup: Arc<dyn SuccessorLookup> = match self.routing {
            Routing::Full => Arc::new(FullRingLookup::new(dht.clone())),
            Routing::Finger => Arc::new(FingerLookup::new(transport.clone())),
        };
        let storage = Arc::new(RecordStore::new(self.storage));
        let coordinator = Coordinator::new(
            transport.clone(),
            storage.clone(),
            lookup.clone(),
            self.quorum,
        );
        let handoff = HintedHandoff::new(transport.clone(), storage.clone(), coordinator.clone());
        let message_handler = MessageHandler::new(
            transport.clone(),
            storage.clone(),
            handoff.clone(),
            self.routing,
        );
        let stabilizer = Arc::new(Stabilizer::new(
            transport.clone(),
            lookup.clone(),
            handoff,
            self.routing,
        ));

        tracing::info!(
            "node {} at {}: N={} R={} W={}, {} consistency, {:?} routing",
            id,
            dht.address,
            self.quorum.n,
            self.quorum.r,
            self.quorum.w,
            self.quorum.consistency_level(),
            self.routing
        );

        Ok(Arc::new(Swarm {
            dht,
            transport,
            storage,
            coordinator,
            message_handler,
            stabilizer,
            lookup,
            routing: self.routing,
            join_retries: self.join_retries,
        }))
    }
}
