//! Tunable consistency on top of the ring: quorum reads and writes, sloppy quorum,
//! hinted handoff and version vectors.

pub mod handoff;
pub mod quorum;
pub mod vector_clock;

pub use handoff::HintedHandoff;
pub use quorum::ConsistencyLevel;
pub use quorum::Coordinator;
pub use quorum::QuorumConfig;
pub use quorum::Versioned;
pub use vector_clock::Causality;
pub use vector_clock::VersionVector;
