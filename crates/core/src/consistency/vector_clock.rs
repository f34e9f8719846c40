#![warn(missing_docs)]
//! Version vectors, one logical counter per node, used to order versions of a key.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::NodeId;

/// Causal relation between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Causality {
    /// Same history.
    Equal,
    /// Left happened before right.
    Before,
    /// Left happened after right.
    After,
    /// Neither dominates.
    Concurrent,
}

/// Mapping from node id to a monotonically non-decreasing counter.
/// Missing entries are zero, so zero entries are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector(BTreeMap<NodeId, u64>);

impl VersionVector {
    /// Empty vector, dominated by every other.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter of a node.
    pub fn get(&self, id: NodeId) -> u64 {
        self.0.get(&id).copied().unwrap_or(0)
    }

    /// Whether no node wrote yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of this vector with the entry of `owner` bumped by one.
    /// Only ever call it with the id of the local node.
    pub fn increment(&self, owner: NodeId) -> Self {
        let mut v = self.clone();
        *v.0.entry(owner).or_insert(0) += 1;
        v
    }

    /// Entrywise maximum.
    pub fn merge(&self, other: &Self) -> Self {
        let mut v = self.clone();
        for (id, c) in other.0.iter() {
            let e = v.0.entry(*id).or_insert(0);
            *e = (*e).max(*c);
        }
        v
    }

    /// Compare two vectors, missing entries count as zero.
    pub fn compare(&self, other: &Self) -> Causality {
        let mut less = false;
        let mut greater = false;
        for id in self.0.keys().chain(other.0.keys()) {
            match self.get(*id).cmp(&other.get(*id)) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
        }
        match (less, greater) {
            (false, false) => Causality::Equal,
            (true, false) => Causality::Before,
            (false, true) => Causality::After,
            (true, true) => Causality::Concurrent,
        }
    }

    /// True iff `self` is strictly older than `other`.
    pub fn dominated_by(&self, other: &Self) -> bool {
        self.compare(other) == Causality::Before
    }

    /// Sum of all counters, the first key of the conflict tie-break.
    pub fn sum(&self) -> u64 {
        self.0.values().sum()
    }

    /// Entries in ascending node id order.
    pub fn entries(&self) -> impl Iterator<Item = (&NodeId, &u64)> {
        self.0.iter()
    }
}

impl From<Vec<(u64, u64)>> for VersionVector {
    fn from(entries: Vec<(u64, u64)>) -> Self {
        Self(
            entries
                .into_iter()
                .filter(|(_, c)| *c > 0)
                .map(|(id, c)| (NodeId::new(id), c))
                .collect(),
        )
    }
}

impl std::fmt::Display for VersionVector {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let entries: Vec<String> = self.0.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
        write!(f, "{{{}}}", entries.join(", "))
    }
}

/// Deterministic order used to pick a winner among concurrent versions:
/// larger counter sum first, then the vector with the larger counter at the highest
/// differing node id, then the larger value.
pub fn tie_break(a: (&VersionVector, &str), b: (&VersionVector, &str)) -> Ordering {
    a.0.sum()
        .cmp(&b.0.sum())
        .then_with(|| {
            let ids: std::collections::BTreeSet<&NodeId> = a.0 .0.keys().chain(b.0 .0.keys()).collect();
            ids.into_iter()
                .rev()
                .map(|id| a.0.get(*id).cmp(&b.0.get(*id)))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.1.cmp(b.1))
}

/// Causally maximal versions: those not dominated by any other.
/// Equal versions collapse to the first one seen.
pub fn maxima<'a, I>(versions: I) -> Vec<(&'a VersionVector, &'a str)>
where I: IntoIterator<Item = (&'a VersionVector, &'a str)> {
    let all: Vec<(&VersionVector, &str)> = versions.into_iter().collect();
    let mut ret: Vec<(&VersionVector, &str)> = vec![];
    for (i, (v, value)) in all.iter().enumerate() {
        let dominated = all.iter().any(|(o, _)| v.dominated_by(o));
        let duplicate = all[..i]
            .iter()
            .any(|(o, _)| v.compare(o) == Causality::Equal);
        if !dominated && !duplicate {
            ret.push((*v, *value));
        }
    }
    ret
}

/// Reconcile a set of versions of one key into a single value and version.
/// The value comes from the [tie_break] winner among the maxima; the version
/// is the merge of all maxima so that it supersedes each of them.
pub fn reconcile<'a, I>(versions: I) -> Option<(String, VersionVector)>
where I: IntoIterator<Item = (&'a VersionVector, &'a str)> {
    let max = maxima(versions);
    let winner = max.iter().copied().max_by(|a, b| tie_break(*a, *b))?;
    let version = max
        .iter()
        .fold(VersionVector::new(), |acc, (v, _)| acc.merge(v));
    if max.len() > 1 {
        tracing::debug!(
            "reconciled {} concurrent versions, winner {}",
            max.len(),
            winner.0
        );
    }
    Some((winner.1.to_string(), version))
}
