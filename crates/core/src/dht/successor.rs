//! Successor for PeerRing
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;

use crate::dht::did::BiasId;
use crate::dht::did::IdSpace;
use crate::dht::did::SortRing;
use crate::dht::NodeId;
use crate::error::Error;
use crate::error::Result;

/// A sequence of successors for a node on the ring.
/// It's necessary to have multiple successors to prevent a single point of failure,
/// they double as the failover replicas of the keys this node owns.
/// Note the successors are in order of a clockwise distance from the node.
#[derive(Debug, Clone)]
pub struct SuccessorSeq {
    /// Node id
    did: NodeId,
    space: IdSpace,
    /// Max successor num
    max: u8,
    /// Successors
    successors: Arc<RwLock<Vec<NodeId>>>,
}

pub trait SuccessorReader {
    fn is_empty(&self) -> Result<bool>;
    fn is_full(&self) -> Result<bool>;
    fn get(&self, index: usize) -> Result<Option<NodeId>>;
    fn len(&self) -> Result<usize>;
    fn min(&self) -> Result<NodeId>;
    fn max(&self) -> Result<NodeId>;
    fn list(&self) -> Result<Vec<NodeId>>;
    fn contains(&self, did: &NodeId) -> Result<bool>;
}

pub trait SuccessorWriter {
    fn update(&self, successor: NodeId) -> Result<Option<NodeId>>;
    fn remove(&self, did: NodeId) -> Result<()>;
    /// Replace the whole sequence, keeping clockwise order and capacity.
    fn reset(&self, succ_list: &[NodeId]) -> Result<()>;
}

impl SuccessorSeq {
    pub fn new(did: NodeId, space: IdSpace, max: u8) -> Self {
        Self {
            did,
            space,
            max: max.max(1),
            successors: Arc::new(RwLock::new(vec![])),
        }
    }

    pub fn successors(&self) -> Result<RwLockReadGuard<Vec<NodeId>>> {
        self.successors
            .read()
            .map_err(|_| Error::FailedToReadSuccessors)
    }

    /// Calculate bias of the id on the ring.
    pub fn bias(&self, did: NodeId) -> BiasId {
        self.space.bias(self.did, did)
    }
}

impl SuccessorReader for SuccessorSeq {
    fn contains(&self, did: &NodeId) -> Result<bool> {
        let succs = self.successors()?;
        Ok(succs.contains(did))
    }

    fn is_empty(&self) -> Result<bool> {
        let succs = self.successors()?;
        Ok(succs.is_empty())
    }

    fn is_full(&self) -> Result<bool> {
        let succs = self.successors()?;
        Ok(succs.len() as u8 >= self.max)
    }

    fn get(&self, index: usize) -> Result<Option<NodeId>> {
        let succs = self.successors()?;
        Ok(succs.get(index).copied())
    }

    fn len(&self) -> Result<usize> {
        let succs = self.successors()?;
        Ok(succs.len())
    }

    fn min(&self) -> Result<NodeId> {
        Ok(self.get(0)?.unwrap_or(self.did))
    }

    fn max(&self) -> Result<NodeId> {
        let succs = self.successors()?;
        Ok(succs.last().copied().unwrap_or(self.did))
    }

    fn list(&self) -> Result<Vec<NodeId>> {
        let succs = self.successors()?;
        Ok(succs.clone())
    }
}

impl SuccessorWriter for SuccessorSeq {
    fn update(&self, successor: NodeId) -> Result<Option<NodeId>> {
        // if successor in successor list
        // or successor is self
        // or list is full and successor is farther than successor.max()
        if (self.contains(&successor)?) || (successor == self.did) {
            return Ok(None);
        }

        if self.bias(successor) >= self.bias(self.max()?) && self.is_full()? {
            return Ok(None);
        }

        let mut succs = self
            .successors
            .write()
            .map_err(|_| Error::FailedToWriteSuccessors)?;

        succs.push(successor);
        succs.sort(self.space, self.did);
        succs.truncate(self.max.into());
        if succs.contains(&successor) {
            Ok(Some(successor))
        } else {
            Ok(None)
        }
    }

    fn remove(&self, did: NodeId) -> Result<()> {
        let mut succs = self
            .successors
            .write()
            .map_err(|_| Error::FailedToWriteSuccessors)?;
        succs.retain(|&v| v != did);
        Ok(())
    }

    fn reset(&self, succ_list: &[NodeId]) -> Result<()> {
        let mut list: Vec<NodeId> = vec![];
        for s in succ_list {
            if *s != self.did && !list.contains(s) {
                list.push(*s);
            }
        }
        list.sort(self.space, self.did);
        list.truncate(self.max.into());

        let mut succs = self
            .successors
            .write()
            .map_err(|_| Error::FailedToWriteSuccessors)?;
        *succs = list;
        Ok(())
    }
}
