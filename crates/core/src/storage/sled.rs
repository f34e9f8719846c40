#![warn(missing_docs)]

//! Durable storage, use `sled` as backend db.

use async_trait::async_trait;
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::storage::KvStorageInterface;

/// Storage instance backed by a sled tree on disk.
pub struct SledStorage {
    db: sled::Db,
    cap: u32,
    path: String,
}

impl SledStorage {
    /// New SledStorage
    /// * cap: max_size in bytes
    /// * path: db file location
    pub async fn new_with_cap_and_path<P>(cap: u32, path: P) -> Result<Self>
    where P: AsRef<std::path::Path> {
        let db = sled::Config::new()
            .path(path.as_ref())
            .mode(sled::Mode::HighThroughput)
            .cache_capacity(cap as u64)
            .open()
            .map_err(Error::SledError)?;
        tracing::info!("opened sled storage at {}", path.as_ref().display());
        Ok(Self {
            db,
            cap,
            path: path.as_ref().to_string_lossy().to_string(),
        })
    }

    /// Flush dirty pages to disk.
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(Error::SledError)?;
        Ok(())
    }
}

#[async_trait]
impl<V> KvStorageInterface<V> for SledStorage
where V: Serialize + DeserializeOwned + Sync
{
    async fn get(&self, key: &str) -> Result<Option<V>> {
        let v = self.db.get(key).map_err(Error::SledError)?;
        if let Some(v) = v {
            return bincode::deserialize(v.as_ref())
                .map_err(Error::BincodeDeserialize)
                .map(Some);
        }
        Ok(None)
    }

    /// A put is flushed before returning, so the entry survives a crash right after.
    async fn put(&self, key: &str, value: &V) -> Result<()> {
        let data = bincode::serialize(&value).map_err(Error::BincodeSerialize)?;
        tracing::debug!("Try inserting key: {:?}", key);
        self.db.insert(key, data).map_err(Error::SledError)?;
        self.flush().await
    }

    async fn get_all(&self) -> Result<Vec<(String, V)>> {
        let iter = self.db.iter();
        Ok(iter
            .flatten()
            .flat_map(|(k, v)| {
                let key = match std::str::from_utf8(k.as_ref()) {
                    Ok(key) => key.to_string(),
                    Err(e) => {
                        tracing::warn!("skip record with non utf-8 key {:?}: {}", k, e);
                        return None;
                    }
                };
                match bincode::deserialize(v.as_ref()) {
                    Ok(value) => Some((key, value)),
                    Err(e) => {
                        tracing::warn!("skip undecodable record {}: {}", key, e);
                        None
                    }
                }
            })
            .collect_vec())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.db.remove(key.as_bytes()).map_err(Error::SledError)?;
        self.flush().await
    }

    async fn clear(&self) -> Result<()> {
        self.db.clear().map_err(Error::SledError)?;
        self.flush().await
    }

    async fn count(&self) -> Result<u32> {
        Ok(self.db.len() as u32)
    }
}

impl std::fmt::Debug for SledStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStorage")
            .field("cap", &self.cap)
            .field("path", &self.path)
            .finish()
    }
}
