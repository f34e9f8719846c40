//! Replica placement with sloppy quorum.
use super::NodeId;
use super::NodeInfo;

/// One destination of a replicated write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaTarget {
    pub node: NodeInfo,
    /// Set when `node` stands in for a dead natural replica.
    pub hint_for: Option<NodeId>,
}

/// The replica set of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSet {
    /// Natural owner of the key, the first node clockwise from its hash.
    pub owner: Option<NodeId>,
    /// Alive destinations, in ring order.
    pub targets: Vec<ReplicaTarget>,
    /// Dead natural replicas for which no substitute was left on the ring.
    pub unplaced: Vec<NodeId>,
}

impl ReplicaSet {
    /// Build the replica set from nodes listed clockwise from the key's hash.
    ///
    /// The first `n` nodes are the natural replicas. Alive ones are used as is. Each
    /// dead one is replaced by the next alive node after the natural window, which
    /// records the dead id as its hint target.
    pub fn compute(candidates: &[NodeInfo], n: usize) -> Self {
        let natural = &candidates[..n.min(candidates.len())];
        let mut spares = candidates[natural.len()..].iter().filter(|c| c.alive);

        let mut targets = vec![];
        let mut unplaced = vec![];
        for node in natural {
            if node.alive {
                targets.push(ReplicaTarget {
                    node: node.clone(),
                    hint_for: None,
                });
                continue;
            }
            match spares.next() {
                Some(sub) => targets.push(ReplicaTarget {
                    node: sub.clone(),
                    hint_for: Some(node.id),
                }),
                None => unplaced.push(node.id),
            }
        }

        Self {
            owner: natural.first().map(|n| n.id),
            targets,
            unplaced,
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.targets.iter().any(|t| t.node.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64, alive: bool) -> NodeInfo {
        NodeInfo {
            id: NodeId::new(id),
            address: format!("node-{}", id),
            alive,
        }
    }

    #[test]
    fn test_all_alive() {
        let ring = vec![node(100, true), node(10, true), node(50, true), node(70, true)];
        let set = ReplicaSet::compute(&ring, 3);
        assert_eq!(set.owner, Some(NodeId::new(100)));
        assert_eq!(
            set.targets.iter().map(|t| (t.node.id.as_u64(), t.hint_for)).collect::<Vec<_>>(),
            vec![(100, None), (10, None), (50, None)]
        );
        assert!(set.unplaced.is_empty());
    }

    #[test]
    fn test_dead_replica_is_substituted_with_hint() {
        let ring = vec![node(100, true), node(10, false), node(50, true), node(70, true)];
        let set = ReplicaSet::compute(&ring, 3);
        assert_eq!(
            set.targets.iter().map(|t| (t.node.id.as_u64(), t.hint_for)).collect::<Vec<_>>(),
            vec![(100, None), (70, Some(NodeId::new(10))), (50, None)]
        );
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_no_spare_left() {
        let ring = vec![node(100, false), node(10, true), node(50, true)];
        let set = ReplicaSet::compute(&ring, 3);
        assert_eq!(set.owner, Some(NodeId::new(100)), "owner is natural even when dead");
        assert_eq!(set.len(), 2);
        assert_eq!(set.unplaced, vec![NodeId::new(100)]);
        assert!(!set.contains(NodeId::new(100)));
    }

    #[test]
    fn test_small_ring() {
        let ring = vec![node(10, true)];
        let set = ReplicaSet::compute(&ring, 3);
        assert_eq!(set.len(), 1);
        assert!(ReplicaSet::compute(&[], 3).is_empty());
    }
}
