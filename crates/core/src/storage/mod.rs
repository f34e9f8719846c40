//! Module of MemStorage, SledStorage and the record store built on them.

pub mod memory;
pub mod record;
#[cfg(feature = "sled")]
pub mod sled;

use async_trait::async_trait;

use crate::error::Result;
pub use crate::storage::memory::MemStorage;
pub use crate::storage::record::KeyListing;
pub use crate::storage::record::record_key;
pub use crate::storage::record::Record;
pub use crate::storage::record::RecordStore;
pub use crate::storage::record::Role;
#[cfg(feature = "sled")]
pub use crate::storage::sled::SledStorage;

/// Key value storage interface
#[async_trait]
pub trait KvStorageInterface<V> {
    /// Get an entry by `key`.
    async fn get(&self, key: &str) -> Result<Option<V>>;

    /// Put `entry` in the storage under `key`.
    async fn put(&self, key: &str, value: &V) -> Result<()>;

    /// Get all entries.
    async fn get_all(&self) -> Result<Vec<(String, V)>>;

    /// Remove an `entry` by `key`.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Delete all values.
    async fn clear(&self) -> Result<()>;

    /// Get the current storage usage.
    async fn count(&self) -> Result<u32>;
}

/// Storage backend accepted by [RecordStore].
pub type RecordStorage = Box<dyn KvStorageInterface<Record> + Send + Sync>;
