//! Chord algorithm implement.
#![warn(missing_docs)]
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::RwLock;

use serde::Deserialize;
use serde::Serialize;

use super::did::BiasId;
use super::did::IdSpace;
use super::peer::NodeInfo;
use super::successor::SuccessorSeq;
use super::types::Chord;
use super::FingerTable;
use crate::dht::NodeId;
use crate::dht::SuccessorReader;
use crate::dht::SuccessorWriter;
use crate::error::Error;
use crate::error::Result;

/// PeerRing is the local view of the ring held by one node.
/// All nodes form a clockwise ring in the order of [NodeId].
/// Besides the Chord pointers it keeps a table of every peer it ever heard of,
/// with a liveness flag, which backs full-ring lookups and replica placement.
pub struct PeerRing {
    /// The id of current node.
    pub id: NodeId,
    /// Transport address of current node.
    pub address: String,
    /// Identifier space of the ring.
    pub space: IdSpace,
    /// [FingerTable] help node to find successor quickly.
    pub finger: Arc<Mutex<FingerTable>>,
    /// The next nodes on the ring, nearest first.
    pub successor_seq: SuccessorSeq,
    /// The id of previous node on the ring.
    pub predecessor: Arc<Mutex<Option<NodeId>>>,
    peers: Arc<RwLock<BTreeMap<NodeId, NodeInfo>>>,
}

/// Type alias is just for making the code easy to read.
type Target = NodeId;

/// `PeerRing` use this to describe the result of [Chord] algorithm. Sometimes it's a
/// direct result, sometimes it's an action that is continued externally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerRingAction {
    /// No result, the whole manipulation is done internally.
    None,
    /// Found some node.
    Some(NodeId),
    /// Trigger a remote action.
    RemoteAction(Target, RemoteAction),
}

/// Some of the process needs to be done remotely. This enum is used to describe that.
///
/// To avoid ambiguity, `did_a` is the target declared in [PeerRingAction] and
/// `did_b` is the id carried by this [RemoteAction].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteAction {
    /// Need `did_a` to find `did_b`.
    FindSuccessor(NodeId),
    /// Let `did_a` [notify](Chord::notify) `did_b`.
    Notify(NodeId),
    /// Fetch successor list and predecessor from `did_a`.
    QueryForTopoInfo,
}

/// Information about successor and predecessor
#[derive(Debug, PartialEq, Eq, Deserialize, Serialize, Clone)]
pub struct TopoInfo {
    /// Successor list
    pub successors: Vec<NodeInfo>,
    /// Predecessor
    pub predecessor: Option<NodeInfo>,
}

impl TryFrom<&PeerRing> for TopoInfo {
    type Error = Error;
    fn try_from(dht: &PeerRing) -> Result<TopoInfo> {
        let successors = dht
            .successors()
            .list()?
            .into_iter()
            .filter_map(|id| dht.peer(id).ok().flatten())
            .collect();
        let predecessor = dht.predecessor()?;
        Ok(TopoInfo {
            successors,
            predecessor,
        })
    }
}

impl PeerRingAction {
    /// Returns `true` if the action is a [PeerRingAction::None] value.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns `true` if the action is a [PeerRingAction::Some] value.
    pub fn is_some(&self) -> bool {
        matches!(self, Self::Some(_))
    }

    /// Returns `true` if the action is a [PeerRingAction::RemoteAction] value.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteAction(..))
    }
}

impl PeerRing {
    /// Create the ring view of a node. `succ_max` is the capacity of the successor list.
    pub fn new(id: NodeId, address: impl Into<String>, space: IdSpace, succ_max: u8) -> Self {
        let address = address.into();
        let mut peers = BTreeMap::new();
        peers.insert(id, NodeInfo::new(id, address.clone()));
        Self {
            successor_seq: SuccessorSeq::new(id, space, succ_max),
            predecessor: Arc::new(Mutex::new(None)),
            finger: Arc::new(Mutex::new(FingerTable::new(id, space))),
            peers: Arc::new(RwLock::new(peers)),
            address,
            space,
            id,
        }
    }

    /// NodeInfo of current node.
    pub fn info(&self) -> NodeInfo {
        NodeInfo::new(self.id, self.address.clone())
    }

    /// Return successor sequence
    pub fn successors(&self) -> SuccessorSeq {
        self.successor_seq.clone()
    }

    /// The immediate successor, self when the ring is a singleton.
    pub fn successor(&self) -> Result<NodeInfo> {
        let id = self.successors().min()?;
        Ok(self.peer(id)?.unwrap_or_else(|| self.info()))
    }

    /// The predecessor, resolved to its NodeInfo.
    pub fn predecessor(&self) -> Result<Option<NodeInfo>> {
        let pred = *self.lock_predecessor()?;
        match pred {
            Some(id) => self.peer(id),
            None => Ok(None),
        }
    }

    /// Lock and return MutexGuard of finger table.
    pub fn lock_finger(&self) -> Result<MutexGuard<FingerTable>> {
        self.finger.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Lock and return MutexGuard of predecessor.
    pub fn lock_predecessor(&self) -> Result<MutexGuard<Option<NodeId>>> {
        self.predecessor.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Calculate bias of the id on the ring.
    pub fn bias(&self, id: NodeId) -> BiasId {
        self.space.bias(self.id, id)
    }

    /// Look up a known peer.
    pub fn peer(&self, id: NodeId) -> Result<Option<NodeInfo>> {
        let peers = self.peers.read().map_err(|_| Error::DHTSyncLockError)?;
        Ok(peers.get(&id).cloned())
    }

    /// Every known peer, self included, ordered by id.
    pub fn peers(&self) -> Result<Vec<NodeInfo>> {
        let peers = self.peers.read().map_err(|_| Error::DHTSyncLockError)?;
        Ok(peers.values().cloned().collect())
    }

    /// Is the peer believed alive. Unknown peers are assumed alive.
    pub fn is_alive(&self, id: NodeId) -> Result<bool> {
        Ok(self.peer(id)?.map(|p| p.alive).unwrap_or(true))
    }

    /// Record a peer, or refresh its address. Contact is evidence of life,
    /// so the entry is marked alive. Returns true if the peer was unknown.
    pub fn add_peer(&self, node: NodeInfo) -> Result<bool> {
        let mut peers = self.peers.write().map_err(|_| Error::DHTSyncLockError)?;
        match peers.get_mut(&node.id) {
            Some(p) => {
                p.address = node.address;
                p.alive = true;
                Ok(false)
            }
            None => {
                tracing::info!("[PeerRing {}] learned new peer {}", self.id, node);
                peers.insert(node.id, NodeInfo::new(node.id, node.address));
                Ok(true)
            }
        }
    }

    /// Mark a peer suspected-dead and drop it from the routing pointers.
    /// The peer entry itself is kept. Returns true if it was alive before.
    pub fn mark_dead(&self, id: NodeId) -> Result<bool> {
        if id == self.id {
            return Ok(false);
        }
        let was_alive = {
            let mut peers = self.peers.write().map_err(|_| Error::DHTSyncLockError)?;
            match peers.get_mut(&id) {
                Some(p) => std::mem::replace(&mut p.alive, false),
                None => false,
            }
        };
        self.remove(id)?;
        if was_alive {
            tracing::warn!("[PeerRing {}] peer {} suspected dead", self.id, id);
        }
        Ok(was_alive)
    }

    /// Mark a known peer alive. Returns true if it was suspected dead before.
    pub fn mark_alive(&self, id: NodeId) -> Result<bool> {
        let revived = {
            let mut peers = self.peers.write().map_err(|_| Error::DHTSyncLockError)?;
            match peers.get_mut(&id) {
                Some(p) => !std::mem::replace(&mut p.alive, true),
                None => false,
            }
        };
        if revived {
            tracing::info!("[PeerRing {}] peer {} is alive again", self.id, id);
            self.lock_finger()?.join(id);
            self.successors().update(id)?;
        }
        Ok(revived)
    }

    /// Remove a node from finger table and successor sequence.
    /// If successor_seq become empty, try setting the closest node to it.
    pub fn remove(&self, id: NodeId) -> Result<()> {
        let mut finger = self.lock_finger()?;
        let successor = self.successors();
        let mut predecessor = self.lock_predecessor()?;
        if *predecessor == Some(id) {
            *predecessor = None;
        }
        finger.remove(id);
        successor.remove(id)?;
        if successor.is_empty()? {
            if let Some(x) = finger.first() {
                successor.update(x)?;
            }
        }
        Ok(())
    }

    /// Owner of `id` by scanning every alive known peer: the first one at or after `id`
    /// walking clockwise.
    pub fn owner_of(&self, id: NodeId) -> Result<NodeInfo> {
        let peers = self.peers.read().map_err(|_| Error::DHTSyncLockError)?;
        Ok(peers
            .values()
            .filter(|p| p.alive)
            .min_by_key(|p| self.space.distance(id, p.id))
            .cloned()
            .unwrap_or_else(|| self.info()))
    }

    /// Known peers, dead ones included, clockwise from the owner point of `id`.
    pub fn walk(&self, id: NodeId, count: usize) -> Result<Vec<NodeInfo>> {
        let peers = self.peers.read().map_err(|_| Error::DHTSyncLockError)?;
        let mut nodes: Vec<NodeInfo> = peers.values().cloned().collect();
        nodes.sort_by_key(|p| self.space.distance(id, p.id));
        nodes.truncate(count);
        Ok(nodes)
    }

    /// Replace the successor list with `[successor] + list`, skipping dead entries.
    pub fn reset_successors(&self, successor: NodeId, list: &[NodeInfo]) -> Result<()> {
        for n in list {
            if n.id != self.id && self.peer(n.id)?.is_none() {
                self.add_peer(n.clone())?;
            }
        }
        let mut ids = vec![successor];
        for n in list {
            if self.is_alive(n.id)? {
                ids.push(n.id);
            }
        }
        self.successors().reset(&ids)?;
        Ok(())
    }

    /// Take the next finger slot to fix, returns `(index, start)`.
    pub fn next_finger(&self) -> Result<(u8, NodeId)> {
        Ok(self.lock_finger()?.next_fix())
    }

    /// Store a resolved finger.
    pub fn set_finger(&self, index: u8, id: NodeId) -> Result<()> {
        let mut finger = self.lock_finger()?;
        if finger.fix_finger_index == index {
            finger.set_fix(id);
        } else {
            finger.set(index as usize, id);
        }
        Ok(())
    }

    /// Forget the current predecessor.
    pub fn clear_predecessor(&self) -> Result<()> {
        *self.lock_predecessor()? = None;
        Ok(())
    }

    /// Form a singleton ring: successor and predecessor are self.
    pub fn init_singleton(&self) -> Result<()> {
        self.successors().reset(&[])?;
        *self.lock_predecessor()? = Some(self.id);
        Ok(())
    }
}

impl Chord<PeerRingAction> for PeerRing {
    /// Learn a node on the ring.
    /// This method is usually invoked to maintain successor sequence and finger table
    /// after a join announcement or the first contact with a node.
    ///
    /// If the node just became the successor of current node, a [RemoteAction::Notify]
    /// is returned so the caller can tell it about current node.
    fn join(&self, node: NodeInfo) -> Result<PeerRingAction> {
        if node.id == self.id {
            return Ok(PeerRingAction::None);
        }
        let id = node.id;
        let before = self.successors().min()?;
        self.add_peer(node)?;
        self.lock_finger()?.join(id);
        // Always try update
        self.successors().update(id)?;

        if before != id && self.successors().min()? == id {
            Ok(PeerRingAction::RemoteAction(id, RemoteAction::Notify(self.id)))
        } else {
            Ok(PeerRingAction::None)
        }
    }

    /// Find the successor of an id.
    /// May return a remote action for the successor is recorded in another node.
    fn find_successor(&self, id: NodeId) -> Result<PeerRingAction> {
        let succ = self.successors().min()?;

        let ret = if succ == self.id || self.space.in_range(id, self.id, succ) {
            // The id falls between self and successor, so successor owns it.
            PeerRingAction::Some(succ)
        } else {
            // Otherwise, find the closest preceding node and ask it to find the successor.
            let mut closest_predecessor = self.lock_finger()?.closest_predecessor(id);
            // The successor list may know a closer node than the fingers.
            for s in self.successors().list()? {
                if self.space.between(closest_predecessor, s, id) {
                    closest_predecessor = s;
                }
            }
            if closest_predecessor == self.id {
                PeerRingAction::Some(succ)
            } else {
                PeerRingAction::RemoteAction(closest_predecessor, RemoteAction::FindSuccessor(id))
            }
        };

        tracing::debug!(
            "find_successor: self: {}, id: {}, successor: {}, result: {:?}",
            self.id,
            id,
            succ,
            ret
        );
        Ok(ret)
    }

    /// Handle notification from a node that thinks it is the predecessor of current node.
    /// Adopt it if there is no predecessor, or if it lies strictly between the current
    /// predecessor and current node. Returns the predecessor after the update.
    fn notify(&self, id: NodeId) -> Result<NodeId> {
        if id == self.id {
            return Ok(self.lock_predecessor()?.unwrap_or(self.id));
        }
        let mut predecessor = self.lock_predecessor()?;

        match *predecessor {
            Some(pre) if !self.space.between(pre, id, self.id) => Ok(pre),
            _ => {
                tracing::info!("[PeerRing {}] predecessor set to {}", self.id, id);
                *predecessor = Some(id);
                Ok(id)
            }
        }
    }
}
