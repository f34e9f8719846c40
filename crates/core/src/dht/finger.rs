#![warn(missing_docs)]
use std::ops::Index;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::did::IdSpace;
use crate::dht::NodeId;

/// Finger table of Chord DHT.
/// The k-th entry holds the first known node that succeeds `did` by at least `2^k`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FingerTable {
    did: NodeId,
    space: IdSpace,
    finger: Vec<Option<NodeId>>,
    pub(super) fix_finger_index: u8,
}

impl PartialEq for FingerTable {
    fn eq(&self, other: &Self) -> bool {
        self.did == other.did && self.finger == other.finger
    }
}

impl FingerTable {
    /// builder, one slot per bit of the identifier space.
    pub fn new(did: NodeId, space: IdSpace) -> Self {
        Self {
            did,
            space,
            finger: vec![None; space.bits() as usize],
            fix_finger_index: 0,
        }
    }

    /// is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get first element from Finger Table
    pub fn first(&self) -> Option<NodeId> {
        self.finger.iter().flatten().next().copied()
    }

    /// getter
    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.finger.get(index).copied().flatten()
    }

    /// ref getter
    pub fn get_ref(&self, index: usize) -> &Option<NodeId> {
        if index >= self.finger.len() {
            return &None;
        }
        &self.finger[index]
    }

    /// setter
    pub fn set(&mut self, index: usize, did: NodeId) {
        tracing::debug!("set finger table index: {} did: {}", index, did);
        if index >= self.finger.len() {
            tracing::error!("set finger index out of range, index: {}", index);
            return;
        }
        if did == self.did {
            tracing::debug!("set finger table with self did, ignore it");
            return;
        }
        self.finger[index] = Some(did);
    }

    /// Start identifier of slot `index`.
    pub fn start(&self, index: u8) -> NodeId {
        self.space.finger_start(self.did, index)
    }

    /// setter for fix_finger_index
    pub fn set_fix(&mut self, did: NodeId) {
        let index = self.fix_finger_index as usize;
        self.set(index, did)
    }

    /// Move the fix cursor to the next slot and return `(index, start)` of it.
    pub fn next_fix(&mut self) -> (u8, NodeId) {
        self.fix_finger_index = (self.fix_finger_index + 1) % self.space.bits();
        (self.fix_finger_index, self.start(self.fix_finger_index))
    }

    /// remove a node from finger table.
    /// Slots pointing to it are filled with the entry right after the last of them.
    pub fn remove(&mut self, did: NodeId) {
        let indexes: Vec<usize> = self
            .finger
            .iter()
            .enumerate()
            .filter(|(_, &x)| x == Some(did))
            .map(|(i, _)| i)
            .collect();

        let (Some(&first_idx), Some(&last_idx)) = (indexes.first(), indexes.last()) else {
            return;
        };
        let fix_id = self.finger.get(last_idx + 1).copied().flatten();
        for idx in first_idx..=last_idx {
            self.finger[idx] = fix_id;
        }
    }

    /// Join a node into FingerTable
    pub fn join(&mut self, did: NodeId) {
        if did == self.did {
            return;
        }
        let bias = self.space.bias(self.did, did);

        for k in 0..self.space.bits() {
            if k < 64 && bias.pos() < (1u64 << k) {
                continue;
            }

            if let Some(v) = self.finger[k as usize] {
                if bias > self.space.bias(self.did, v) {
                    continue;
                }
            }

            self.finger[k as usize] = Some(did);
        }
    }

    /// Check finger is contains some node
    pub fn contains(&self, v: Option<NodeId>) -> bool {
        self.finger.contains(&v)
    }

    /// get closest predecessor of `did` among the fingers, falls back to self.
    pub fn closest_predecessor(&self, did: NodeId) -> NodeId {
        let bias = self.space.bias(self.did, did);

        for i in (0..self.finger.len()).rev() {
            if let Some(v) = self.finger[i] {
                if self.space.bias(self.did, v) < bias {
                    return v;
                }
            }
        }

        self.did
    }

    /// get length of finger
    pub fn len(&self) -> usize {
        self.finger.iter().flatten().count()
    }

    /// get finger list
    pub fn list(&self) -> &Vec<Option<NodeId>> {
        &self.finger
    }
}

impl Index<usize> for FingerTable {
    type Output = Option<NodeId>;
    fn index(&self, index: usize) -> &Self::Output {
        self.get_ref(index)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ids(raw: &[u64]) -> Vec<NodeId> {
        raw.iter().copied().map(NodeId::new).collect()
    }

    #[test]
    fn test_finger_table_get_set_remove() {
        let dids = ids(&[0, 10, 20, 30, 40]);
        let space = IdSpace::new(3).unwrap();

        let mut table = FingerTable::new(dids[0], space);
        println!("check finger len");
        assert_eq!(table.len(), 0);
        assert_eq!(table.finger.len(), 3);
        println!("check finger all items is none");
        assert!(table.get(0).is_none(), "index 0 should be None");
        assert!(table.get(3).is_none(), "index 3 should be None");

        println!("set finger item");
        let (id1, id2, id3, id4) = (dids[1], dids[2], dids[3], dids[4]);

        table.set(0, id1);
        table.set(2, id3);
        assert_eq!(table.len(), 2);
        assert!(
            table.get(0) == Some(id1),
            "expect value at index 0 is {:?}, got {:?}",
            Some(id1),
            table.get(0)
        );
        assert!(
            table.get(1).is_none(),
            "expect value at index 1 is None, got {:?}",
            table.get(1)
        );

        println!("set value out of index");
        table.set(4, id4);
        assert_eq!(table.len(), 2);

        println!("set self is ignored");
        table.set(1, dids[0]);
        assert_eq!(table.len(), 2);

        println!("remove node from finger");
        table.remove(id1);
        assert_eq!(table.len(), 1);
        assert!(table.get(0).is_none());
        assert_eq!(table.get(2), Some(id3));

        println!("remove node with auto fill");
        table.set(0, id1);
        table.set(1, id2);
        table.remove(id1);
        assert_eq!(table.list(), &vec![Some(id2), Some(id2), Some(id3)]);
        table.remove(id2);
        assert_eq!(table.list(), &vec![Some(id3), Some(id3), Some(id3)]);
    }

    #[test]
    fn test_finger_join_keeps_closest() {
        let space = IdSpace::new(6).unwrap();
        let mut table = FingerTable::new(NodeId::new(10), space);
        // starts: 11, 12, 14, 18, 26, 42
        table.join(NodeId::new(30));
        assert_eq!(table.list(), &vec![Some(NodeId::new(30)); 5].into_iter().chain([None]).collect::<Vec<_>>());
        table.join(NodeId::new(13));
        assert_eq!(table.get(0), Some(NodeId::new(13)));
        assert_eq!(table.get(1), Some(NodeId::new(13)));
        assert_eq!(table.get(2), Some(NodeId::new(30)));
        table.join(NodeId::new(50));
        assert_eq!(table.get(5), Some(NodeId::new(50)));
        table.join(NodeId::new(5));
        assert_eq!(table.get(5), Some(NodeId::new(50)), "farther node must not replace 50");
    }

    #[test]
    fn test_closest_predecessor() {
        let space = IdSpace::new(6).unwrap();
        let mut table = FingerTable::new(NodeId::new(10), space);
        for id in [13, 30, 50] {
            table.join(NodeId::new(id));
        }
        assert_eq!(table.closest_predecessor(NodeId::new(40)), NodeId::new(30));
        assert_eq!(table.closest_predecessor(NodeId::new(5)), NodeId::new(50));
        assert_eq!(table.closest_predecessor(NodeId::new(12)), NodeId::new(10));
    }

    #[test]
    fn test_fix_cursor_cycles() {
        let space = IdSpace::new(3).unwrap();
        let mut table = FingerTable::new(NodeId::new(1), space);
        assert_eq!(table.next_fix(), (1, NodeId::new(3)));
        assert_eq!(table.next_fix(), (2, NodeId::new(5)));
        assert_eq!(table.next_fix(), (0, NodeId::new(2)));
    }
}
