//! Quorum replication coordinator.
//!
//! A `put` or `get` fans out to the replica set of the key concurrently and returns
//! as soon as W acknowledgements or R responses are in. Replicas that are still
//! running when the threshold is met keep running; their results feed hints and
//! read repair in the background.
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::vector_clock::reconcile;
use super::VersionVector;
use crate::consts::DEFAULT_READ_QUORUM;
use crate::consts::DEFAULT_REPLICAS;
use crate::consts::DEFAULT_WRITE_QUORUM;
use crate::dht::NodeId;
use crate::dht::NodeInfo;
use crate::dht::PeerRing;
use crate::dht::ReplicaSet;
use crate::dht::ReplicaTarget;
use crate::dht::SuccessorLookup;
use crate::error::Error;
use crate::error::Result;
use crate::message::GetReplicaSend;
use crate::message::Message;
use crate::message::PutReplicaSend;
use crate::storage::Record;
use crate::storage::RecordStore;
use crate::storage::Role;
use crate::swarm::transport::SwarmTransport;

/// Replica count and quorum sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumConfig {
    /// N, copies of each key.
    pub n: u8,
    /// R, responses a read waits for.
    pub r: u8,
    /// W, acknowledgements a write waits for.
    pub w: u8,
}

/// What a quorum configuration guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    /// R + W > N, read and write sets always overlap.
    Strong,
    /// R + W = N.
    Moderate,
    /// R + W < N.
    Eventual,
}

impl std::fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Strong => write!(f, "strong (R + W > N)"),
            Self::Moderate => write!(f, "moderate (R + W = N)"),
            Self::Eventual => write!(f, "eventual (R + W < N)"),
        }
    }
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            n: DEFAULT_REPLICAS,
            r: DEFAULT_READ_QUORUM,
            w: DEFAULT_WRITE_QUORUM,
        }
    }
}

impl QuorumConfig {
    /// Build a checked config.
    pub fn new(n: u8, r: u8, w: u8) -> Result<Self> {
        let config = Self { n, r, w };
        config.validate()?;
        Ok(config)
    }

    /// Only 1 <= R, W <= N is enforced; choosing R + W > N is up to the operator.
    pub fn validate(&self) -> Result<()> {
        if self.n == 0 {
            return Err(Error::InvalidQuorumConfig("N must be at least 1".into()));
        }
        if self.r == 0 || self.r > self.n {
            return Err(Error::InvalidQuorumConfig(format!(
                "R = {} must be within 1..={}",
                self.r, self.n
            )));
        }
        if self.w == 0 || self.w > self.n {
            return Err(Error::InvalidQuorumConfig(format!(
                "W = {} must be within 1..={}",
                self.w, self.n
            )));
        }
        Ok(())
    }

    pub fn consistency_level(&self) -> ConsistencyLevel {
        let (n, rw) = (self.n as u16, self.r as u16 + self.w as u16);
        match rw.cmp(&n) {
            std::cmp::Ordering::Greater => ConsistencyLevel::Strong,
            std::cmp::Ordering::Equal => ConsistencyLevel::Moderate,
            std::cmp::Ordering::Less => ConsistencyLevel::Eventual,
        }
    }
}

/// A value with its version, as returned by a quorum read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned {
    pub value: String,
    pub version: VersionVector,
}

type ReplicaCall<T> = JoinHandle<(ReplicaTarget, Result<T>)>;

/// Quorum coordinator. Stateless between calls: everything it needs lives in the
/// ring view and the record store, so cloning it is cheap.
#[derive(Clone)]
pub struct Coordinator {
    transport: Arc<SwarmTransport>,
    storage: Arc<RecordStore>,
    lookup: Arc<dyn SuccessorLookup>,
    config: QuorumConfig,
}

impl Coordinator {
    pub fn new(
        transport: Arc<SwarmTransport>,
        storage: Arc<RecordStore>,
        lookup: Arc<dyn SuccessorLookup>,
        config: QuorumConfig,
    ) -> Self {
        Self {
            transport,
            storage,
            lookup,
            config,
        }
    }

    fn dht(&self) -> &PeerRing {
        &self.transport.dht
    }

    pub fn config(&self) -> QuorumConfig {
        self.config
    }

    /// Replica set of `key`: up to N alive nodes from the owner of its hash, with
    /// dead natural replicas replaced by hinted substitutes.
    pub async fn replica_set_for(&self, key: &str) -> Result<ReplicaSet> {
        let id = self.dht().space.hash_key(key);
        let candidates = self.lookup.walk(id, self.config.n as usize * 2).await?;
        let set = ReplicaSet::compute(&candidates, self.config.n as usize);
        tracing::debug!("replica set of {} ({}): {:?}", key, id, set);
        Ok(set)
    }

    /// Record to write on `target` for this replica set.
    fn replica_record(
        &self,
        key: &str,
        value: &str,
        version: &VersionVector,
        set: &ReplicaSet,
        target: &ReplicaTarget,
    ) -> Record {
        let owner = set.owner.unwrap_or(self.dht().id);
        let role = if target.hint_for.is_none() && target.node.id == owner {
            Role::Primary
        } else {
            Role::Backup
        };
        Record {
            key: key.to_string(),
            value: value.to_string(),
            version: version.clone(),
            role,
            owner,
            hint_for: target.hint_for,
        }
    }

    /// Write one replica, locally if the target is this node.
    pub async fn write_replica(&self, node: &NodeInfo, record: Record) -> Result<VersionVector> {
        if node.id == self.dht().id {
            return Ok(self.storage.apply(record).await?.version);
        }
        match self
            .transport
            .request(node, PutReplicaSend { record }.into())
            .await?
        {
            Message::PutReplicaReport(r) => Ok(r.version),
            _ => Err(Error::InvalidMessage("PutReplicaReport")),
        }
    }

    /// Read one replica, locally if the target is this node.
    pub async fn read_replica(&self, node: &NodeInfo, key: &str) -> Result<Option<Record>> {
        if node.id == self.dht().id {
            return self.storage.latest(key).await;
        }
        match self
            .transport
            .request(node, GetReplicaSend { key: key.to_string() }.into())
            .await?
        {
            Message::GetReplicaReport(r) => Ok(r.record),
            _ => Err(Error::InvalidMessage("GetReplicaReport")),
        }
    }

    /// Keep a hint for `target` on this node, drained later by [super::HintedHandoff].
    async fn hint_locally(&self, target: NodeId, mut record: Record) {
        if target == self.dht().id {
            return;
        }
        record.hint_for = Some(target);
        record.role = Role::Backup;
        tracing::info!("keep hint of {} for node {}", record.key, target);
        if let Err(e) = self.storage.apply(record).await {
            tracing::error!("failed to store hint for {}: {}", target, e);
        }
    }

    fn spawn_reads(
        &self,
        set: &ReplicaSet,
        key: &str,
    ) -> FuturesUnordered<ReplicaCall<Option<Record>>> {
        set.targets
            .iter()
            .cloned()
            .map(|target| {
                let this = self.clone();
                let key = key.to_string();
                tokio::spawn(async move {
                    let ret = this.read_replica(&target.node, &key).await;
                    (target, ret)
                })
            })
            .collect()
    }

    /// Wait for `needed` successful reads or the deadline.
    async fn collect_reads(
        futs: &mut FuturesUnordered<ReplicaCall<Option<Record>>>,
        needed: usize,
        deadline: Instant,
    ) -> Vec<(ReplicaTarget, Option<Record>)> {
        let mut responses = vec![];
        while responses.len() < needed {
            match tokio::time::timeout_at(deadline, futs.next()).await {
                Ok(Some(Ok((target, Ok(record))))) => responses.push((target, record)),
                Ok(Some(Ok((target, Err(e))))) => {
                    tracing::warn!("read from replica {} failed: {}", target.node, e)
                }
                Ok(Some(Err(e))) => tracing::error!("replica read task failed: {}", e),
                Ok(None) | Err(_) => break,
            }
        }
        responses
    }

    /// Highest version of `key` visible on the replicas, used as the base of a new write.
    /// Best effort: replicas that miss the read deadline are left out, and the
    /// write that follows gets a deadline of its own.
    async fn current_version(&self, key: &str, set: &ReplicaSet) -> VersionVector {
        let deadline = Instant::now() + self.transport.timeout();
        let mut futs = self.spawn_reads(set, key);
        let responses = Self::collect_reads(&mut futs, self.config.r as usize, deadline).await;
        let mut version = match self.storage.latest(key).await {
            Ok(Some(r)) => r.version,
            _ => VersionVector::new(),
        };
        for (_, record) in responses.iter() {
            if let Some(r) = record {
                version = version.merge(&r.version);
            }
        }
        version
    }

    /// Quorum write. Without `version` the write supersedes whatever the replicas hold.
    /// Partial writes are not rolled back when the quorum is missed.
    pub async fn put(
        &self,
        key: &str,
        value: &str,
        version: Option<VersionVector>,
    ) -> Result<VersionVector> {
        let set = self.replica_set_for(key).await?;
        let w = self.config.w as usize;
        if set.len() < w {
            return Err(Error::InsufficientReplicas {
                needed: w,
                got: set.len(),
            });
        }
        let base = match version {
            Some(v) => v,
            None => self.current_version(key, &set).await,
        };
        let version = base.increment(self.dht().id);
        tracing::debug!("put {} with version {}", key, version);

        let deadline = Instant::now() + self.transport.timeout();

        let mut futs: FuturesUnordered<ReplicaCall<VersionVector>> = set
            .targets
            .iter()
            .cloned()
            .map(|target| {
                let this = self.clone();
                let record = self.replica_record(key, value, &version, &set, &target);
                tokio::spawn(async move {
                    let ret = this.write_replica(&target.node, record).await;
                    (target, ret)
                })
            })
            .collect();

        let template = self.replica_record(key, value, &version, &set, &ReplicaTarget {
            node: self.dht().info(),
            hint_for: None,
        });
        for dead in set.unplaced.iter() {
            self.hint_locally(*dead, template.clone()).await;
        }

        let mut acks = 0;
        while acks < w {
            match tokio::time::timeout_at(deadline, futs.next()).await {
                Ok(Some(Ok((_, Ok(_))))) => acks += 1,
                Ok(Some(Ok((target, Err(e))))) => {
                    tracing::warn!("write to replica {} failed: {}", target.node, e);
                    let natural = target.hint_for.unwrap_or(target.node.id);
                    self.hint_locally(natural, template.clone()).await;
                }
                Ok(Some(Err(e))) => tracing::error!("replica write task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("put {} timed out with {} of {} acks", key, acks, w);
                    break;
                }
            }
        }

        if !futs.is_empty() {
            let this = self.clone();
            tokio::spawn(async move {
                while let Some(ret) = futs.next().await {
                    if let Ok((target, Err(e))) = ret {
                        tracing::warn!("late write to replica {} failed: {}", target.node, e);
                        let natural = target.hint_for.unwrap_or(target.node.id);
                        this.hint_locally(natural, template.clone()).await;
                    }
                }
            });
        }

        if acks >= w {
            Ok(version)
        } else {
            Err(Error::QuorumWriteFailed {
                needed: w,
                got: acks,
            })
        }
    }

    /// Quorum read. Returns the reconciled value of the causally maximal versions and
    /// repairs replicas that answered with something older.
    pub async fn get(&self, key: &str) -> Result<Versioned> {
        let set = self.replica_set_for(key).await?;
        let r = self.config.r as usize;
        let deadline = Instant::now() + self.transport.timeout();

        let mut futs = self.spawn_reads(&set, key);
        let responses = Self::collect_reads(&mut futs, r, deadline).await;
        if responses.len() < r {
            return Err(Error::QuorumReadFailed {
                needed: r,
                got: responses.len(),
            });
        }

        let Some((value, version)) = reconcile(
            responses
                .iter()
                .filter_map(|(_, record)| record.as_ref())
                .map(|record| (&record.version, record.value.as_str())),
        ) else {
            return Err(Error::NotFound(key.to_string()));
        };

        let selected = Versioned { value, version };
        for (target, record) in responses {
            self.spawn_read_repair(&set, key, &selected, target, record);
        }
        if !futs.is_empty() {
            let this = self.clone();
            let key = key.to_string();
            let selected = selected.clone();
            tokio::spawn(async move {
                while let Some(ret) = futs.next().await {
                    if let Ok((target, Ok(record))) = ret {
                        this.spawn_read_repair(&set, &key, &selected, target, record);
                    }
                }
            });
        }
        Ok(selected)
    }

    /// Overwrite a replica whose answer is strictly older than the selected version.
    fn spawn_read_repair(
        &self,
        set: &ReplicaSet,
        key: &str,
        selected: &Versioned,
        target: ReplicaTarget,
        seen: Option<Record>,
    ) {
        let stale = match &seen {
            Some(r) => r.version.dominated_by(&selected.version),
            None => true,
        };
        if !stale {
            return;
        }
        let record = self.replica_record(key, &selected.value, &selected.version, set, &target);
        let this = self.clone();
        tokio::spawn(async move {
            tracing::debug!("read repair of {} on {}", record.key, target.node);
            if let Err(e) = this.write_replica(&target.node, record).await {
                tracing::warn!("read repair on {} failed: {}", target.node, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_config_validation() {
        assert!(QuorumConfig::new(3, 2, 2).is_ok());
        assert!(QuorumConfig::new(3, 0, 2).is_err());
        assert!(QuorumConfig::new(3, 2, 4).is_err());
        assert!(QuorumConfig::new(0, 1, 1).is_err());
        assert_eq!(QuorumConfig::default(), QuorumConfig::new(3, 2, 2).unwrap());
    }

    #[test]
    fn test_consistency_level() {
        assert_eq!(
            QuorumConfig::new(3, 2, 2).unwrap().consistency_level(),
            ConsistencyLevel::Strong
        );
        assert_eq!(
            QuorumConfig::new(4, 2, 2).unwrap().consistency_level(),
            ConsistencyLevel::Moderate
        );
        assert_eq!(
            QuorumConfig::new(3, 1, 1).unwrap().consistency_level(),
            ConsistencyLevel::Eventual
        );
    }
}
