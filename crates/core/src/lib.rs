//! ChordKV core: a Chord ring key-value engine with Dynamo-style tunable consistency.
//!
//! A node owns an arc of an m-bit identifier ring. Ring membership is maintained by the
//! Chord protocol ([dht]), records are replicated on N successors and read or written with
//! R/W quorums ([consistency]), and causality between versions of the same key is tracked
//! with version vectors.
//!
//! The entry point is [swarm::Swarm], built with [swarm::SwarmBuilder].

pub mod consistency;
pub mod consts;
pub mod dht;
pub mod error;
pub mod inspect;
pub mod message;
pub mod storage;
pub mod swarm;
pub mod transport;

#[cfg(test)]
mod tests;

pub use async_trait::async_trait;
pub use futures;
