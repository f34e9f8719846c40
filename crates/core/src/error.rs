//! Error of chordkv_core

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in chordkv-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Cannot reach bootstrap node {0}")]
    UnreachableBootstrap(String),

    #[error("Replica {0} timed out")]
    ReplicaTimeout(String),

    #[error("Insufficient replicas: needed {needed}, got {got}")]
    InsufficientReplicas { needed: usize, got: usize },

    #[error("Write quorum not reached: needed {needed}, got {got}")]
    QuorumWriteFailed { needed: usize, got: usize },

    #[error("Read quorum not reached: needed {needed}, got {got}")]
    QuorumReadFailed { needed: usize, got: usize },

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Peer {0} is unreachable")]
    PeerUnreachable(String),

    #[error("Remote peer reported an error: {0}")]
    RemoteError(String),

    #[error("Invalid message, expect {0}")]
    InvalidMessage(&'static str),

    #[error("Lookup for {0} exceeded the hop limit")]
    LookupHopsExceeded(u64),

    #[error("Invalid identifier bit width {0}, expect 1..=64")]
    InvalidIdBits(u8),

    #[error("Invalid quorum config: {0}")]
    InvalidQuorumConfig(String),

    #[error("DHT lock poisoned")]
    DHTSyncLockError,

    #[error("Failed to read successors")]
    FailedToReadSuccessors,

    #[error("Failed to write successors")]
    FailedToWriteSuccessors,

    #[error("Bincode serialization error")]
    BincodeSerialize(#[source] bincode::Error),

    #[error("Bincode deserialization error")]
    BincodeDeserialize(#[source] bincode::Error),

    #[error("JSON serialization error")]
    SerializeToString(#[from] serde_json::Error),

    #[cfg(feature = "sled")]
    #[error("Sled error: {0}")]
    SledError(#[from] sled::Error),
}
