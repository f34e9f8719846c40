#![warn(missing_docs)]

//! Identity of nodes and keys on the ring.
//!
//! Every node and every key is mapped onto the same circular identifier space of
//! size 2^m. The space is a cyclic group, so there is no absolute order between two
//! [NodeId]s: whether `a` comes before `b` depends on where you start walking. [BiasId]
//! fixes the starting point and makes ids comparable from there, which is all Chord needs.

use std::cmp::PartialEq;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;

use crate::error::Error;
use crate::error::Result;

/// Position of a node (or the hash of a key) on the ring, in `[0, 2^m)`.
#[derive(Copy, Clone, Eq, Ord, PartialEq, PartialOrd, Debug, Serialize, Deserialize, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Wrap a raw integer. The caller must make sure it lies in the space,
    /// see [IdSpace::id] for the reducing constructor.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw integer value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(NodeId)
            .map_err(|_| Error::InvalidMessage("decimal node id"))
    }
}

impl From<u64> for NodeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// The m-bit circular identifier space.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize, Hash)]
pub struct IdSpace {
    bits: u8,
}

impl IdSpace {
    /// Create a space of `2^bits` identifiers, `bits` must be in `1..=64`.
    pub fn new(bits: u8) -> Result<Self> {
        if bits == 0 || bits > 64 {
            return Err(Error::InvalidIdBits(bits));
        }
        Ok(Self { bits })
    }

    /// Bit width m.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    fn mask(&self) -> u64 {
        if self.bits == 64 {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }

    /// Reduce an arbitrary integer into the space.
    pub fn id(&self, raw: u64) -> NodeId {
        NodeId(raw & self.mask())
    }

    /// Hash arbitrary bytes into the space.
    /// The SHA-1 digest is read as a big-endian integer and reduced modulo 2^m.
    pub fn hash(&self, data: &[u8]) -> NodeId {
        let digest = Sha1::digest(data);
        let tail = digest[digest.len() - 8..]
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | *b as u64);
        self.id(tail)
    }

    /// Identifier of a key.
    pub fn hash_key(&self, key: &str) -> NodeId {
        self.hash(key.as_bytes())
    }

    /// Identifier of a node address.
    pub fn hash_address(&self, address: &str) -> NodeId {
        self.hash(address.as_bytes())
    }

    /// Clockwise distance walking from `from` to `to`.
    pub fn distance(&self, from: NodeId, to: NodeId) -> u64 {
        to.0.wrapping_sub(from.0) & self.mask()
    }

    /// `(id + 2^k) mod 2^m`, the start of the k-th finger interval.
    pub fn finger_start(&self, id: NodeId, k: u8) -> NodeId {
        let step = if k >= 64 { 0 } else { 1u64 << k };
        self.id(id.0.wrapping_add(step))
    }

    /// True iff walking clockwise from `a` you reach `b` strictly before `c`.
    /// When `a == c` the interval is the whole circle except `a` itself.
    pub fn between(&self, a: NodeId, b: NodeId, c: NodeId) -> bool {
        if b == a {
            return false;
        }
        a == c || self.distance(a, b) < self.distance(a, c)
    }

    /// True iff `id` lies in the half open interval `(start, end]`.
    /// When `start == end` the interval is the whole circle.
    pub fn in_range(&self, id: NodeId, start: NodeId, end: NodeId) -> bool {
        start == end || self.between(start, id, end) || id == end
    }

    /// Express `id` relative to `bias`.
    pub fn bias(&self, bias: NodeId, id: NodeId) -> BiasId {
        BiasId {
            bias,
            pos: self.distance(bias, id),
            did: id,
        }
    }
}

impl Default for IdSpace {
    fn default() -> Self {
        Self {
            bits: crate::consts::DEFAULT_ID_BITS,
        }
    }
}

/// While we cannot determine the order between two ids `a` and `b` on a ring,
/// we can fix a reference id `x` and compare which one is closer to it walking
/// clockwise. BiasId is an id observed with `x` as the zero point.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize, Hash)]
pub struct BiasId {
    /// the zero point for determine order of ids.
    bias: NodeId,
    /// clockwise distance from the zero point.
    pos: u64,
    /// the observed id.
    did: NodeId,
}

impl BiasId {
    /// Get the observed id back.
    pub fn to_did(self) -> NodeId {
        self.did
    }

    /// Distance from the zero point.
    pub fn pos(&self) -> u64 {
        self.pos
    }
}

impl PartialOrd for BiasId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BiasId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        debug_assert_eq!(self.bias, other.bias, "compare BiasId with different zero point");
        self.pos.cmp(&other.pos)
    }
}

impl PartialEq<NodeId> for BiasId {
    fn eq(&self, rhs: &NodeId) -> bool {
        self.did == *rhs
    }
}

impl From<BiasId> for NodeId {
    fn from(id: BiasId) -> NodeId {
        id.to_did()
    }
}

/// Sort a collection clockwise starting from a given id.
pub trait SortRing {
    /// Sort in place, the element equal to `did` (if any) comes first.
    fn sort(&mut self, space: IdSpace, did: NodeId);
}

impl SortRing for Vec<NodeId> {
    fn sort(&mut self, space: IdSpace, did: NodeId) {
        self.sort_by_key(|a| space.distance(did, *a));
    }
}
