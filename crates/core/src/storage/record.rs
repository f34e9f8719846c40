//! Replicated records and the per-node store that applies the version merge rule.
use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;

use super::RecordStorage;
use crate::consistency::vector_clock::reconcile;
use crate::consistency::Causality;
use crate::consistency::VersionVector;
use crate::dht::NodeId;
use crate::error::Result;

/// Backend namespace of a node's own copies.
const RECORD_PREFIX: &str = "r:";
/// Backend namespace of hint copies, followed by `<target>:`.
const HINT_PREFIX: &str = "h:";

/// Whether a node holds a record as the canonical owner or as a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Primary,
    Backup,
}

/// A versioned value stored on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: String,
    pub version: VersionVector,
    pub role: Role,
    /// Natural owner of the key when the record was written.
    pub owner: NodeId,
    /// Set on a sloppy-quorum substitute copy: the node it stands in for.
    pub hint_for: Option<NodeId>,
}

impl Record {
    /// Key under which the record lives in the backend.
    /// Own copies and hints live under distinct prefixes, so no user key can
    /// land in a hint slot.
    pub fn storage_key(&self) -> String {
        match self.hint_for {
            Some(target) => hint_key(&self.key, target),
            None => record_key(&self.key),
        }
    }

    pub fn is_hint(&self) -> bool {
        self.hint_for.is_some()
    }
}

/// Backend key of the node's own copy of `key`.
pub fn record_key(key: &str) -> String {
    format!("{}{}", RECORD_PREFIX, key)
}

fn hint_key(key: &str, target: NodeId) -> String {
    format!("{}{}:{}", HINT_PREFIX, target.as_u64(), key)
}

/// Keys held by a node, grouped the way `listKeys` reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyListing {
    pub primary_keys: Vec<String>,
    /// Backups by owning node; hints by the node they stand in for.
    pub backup_keys: BTreeMap<NodeId, Vec<String>>,
}

/// Per-node record store.
/// Every mutation goes through one async mutex, so the read-merge-write of
/// [RecordStore::apply] never interleaves with another write.
pub struct RecordStore {
    storage: RecordStorage,
    write_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(storage: RecordStorage) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// The node's own copy of `key`, hints excluded.
    pub async fn load(&self, key: &str) -> Result<Option<Record>> {
        self.storage.get(&record_key(key)).await
    }

    /// Hint copy of `key` held for `target`.
    pub async fn load_hint(&self, key: &str, target: NodeId) -> Result<Option<Record>> {
        self.storage.get(&hint_key(key, target)).await
    }

    /// Every record in the store.
    pub async fn all(&self) -> Result<Vec<Record>> {
        Ok(self
            .storage
            .get_all()
            .await?
            .into_iter()
            .map(|(_, r)| r)
            .collect())
    }

    /// Records with the given role; hint copies are backups.
    pub async fn enumerate(&self, role: Role) -> Result<Vec<Record>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|r| r.role == role)
            .collect())
    }

    /// Hint copies waiting to be handed off.
    pub async fn hints(&self) -> Result<Vec<Record>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|r| r.is_hint())
            .collect())
    }

    /// Remove a hint copy, unless it changed since `version` was handed off.
    /// Returns whether it was removed.
    pub async fn remove_hint(
        &self,
        key: &str,
        target: NodeId,
        version: &VersionVector,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let skey = hint_key(key, target);
        match self.storage.get(&skey).await? {
            Some(r) if r.version.compare(version) != Causality::After => {
                self.storage.remove(&skey).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Apply a replicated write and return what is stored afterwards.
    ///
    /// An incoming version that is older than or equal to the stored one is a
    /// no-op, a newer one replaces it, and a concurrent one is merged: versions
    /// are folded together and the value is picked by the conflict tie-break.
    pub async fn apply(&self, record: Record) -> Result<Record> {
        let _guard = self.write_lock.lock().await;
        let skey = record.storage_key();

        let stored = match self.storage.get(&skey).await? {
            None => record,
            Some(existing) => match record.version.compare(&existing.version) {
                Causality::Before | Causality::Equal => return Ok(existing),
                Causality::After => record,
                Causality::Concurrent => {
                    let (value, version) = reconcile([
                        (&existing.version, existing.value.as_str()),
                        (&record.version, record.value.as_str()),
                    ])
                    .unwrap_or((record.value.clone(), record.version.merge(&existing.version)));
                    tracing::debug!(
                        "merged concurrent versions of {}: {} and {}",
                        record.key,
                        existing.version,
                        record.version
                    );
                    Record {
                        value,
                        version,
                        ..record
                    }
                }
            },
        };

        self.storage.put(&skey, &stored).await?;
        Ok(stored)
    }

    /// Best local version of `key`: the node's own copy, else the reconciled hints.
    pub async fn latest(&self, key: &str) -> Result<Option<Record>> {
        if let Some(r) = self.load(key).await? {
            return Ok(Some(r));
        }
        let hints: Vec<Record> = self
            .hints()
            .await?
            .into_iter()
            .filter(|r| r.key == key)
            .collect();
        let Some(first) = hints.first() else {
            return Ok(None);
        };
        let Some((value, version)) =
            reconcile(hints.iter().map(|r| (&r.version, r.value.as_str())))
        else {
            return Ok(None);
        };
        Ok(Some(Record {
            value,
            version,
            ..first.clone()
        }))
    }

    /// Keys held, grouped by role and owner.
    pub async fn list_keys(&self) -> Result<KeyListing> {
        let mut listing = KeyListing::default();
        for r in self.all().await? {
            match (r.role, r.hint_for) {
                (_, Some(target)) => listing.backup_keys.entry(target).or_default().push(r.key),
                (Role::Primary, None) => listing.primary_keys.push(r.key),
                (Role::Backup, None) => listing.backup_keys.entry(r.owner).or_default().push(r.key),
            }
        }
        listing.primary_keys.sort();
        for keys in listing.backup_keys.values_mut() {
            keys.sort();
        }
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;

    fn store() -> RecordStore {
        RecordStore::new(Box::new(MemStorage::<Record>::new()))
    }

    fn record(value: &str, version: &[(u64, u64)]) -> Record {
        Record {
            key: "k".to_string(),
            value: value.to_string(),
            version: VersionVector::from(version.to_vec()),
            role: Role::Backup,
            owner: NodeId::new(100),
            hint_for: None,
        }
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() -> Result<()> {
        let store = store();
        let r = record("v1", &[(100, 1)]);
        let first = store.apply(r.clone()).await?;
        let second = store.apply(r.clone()).await?;
        assert_eq!(first, second);
        assert_eq!(store.load("k").await?, Some(r));
        Ok(())
    }

    #[tokio::test]
    async fn test_apply_keeps_newer_and_merges_concurrent() -> Result<()> {
        let store = store();
        store.apply(record("v2", &[(100, 2)])).await?;

        let stored = store.apply(record("v1", &[(100, 1)])).await?;
        assert_eq!(stored.value, "v2", "stale write must not overwrite");

        let stored = store.apply(record("x", &[(100, 1), (50, 1)])).await?;
        assert_eq!(stored.version, VersionVector::from(vec![(100, 2), (50, 1)]));
        assert_eq!(stored.value, "v2", "equal sums, the entry of node 100 decides");

        let stored = store.apply(record("v3", &[(100, 3), (50, 1)])).await?;
        assert_eq!(stored.value, "v3");
        Ok(())
    }

    #[tokio::test]
    async fn test_hints_live_beside_own_copy() -> Result<()> {
        let store = store();
        store.apply(record("mine", &[(100, 1)])).await?;
        let mut hint = record("hinted", &[(100, 2)]);
        hint.hint_for = Some(NodeId::new(10));
        store.apply(hint.clone()).await?;

        assert_eq!(store.load("k").await?.map(|r| r.value), Some("mine".to_string()));
        assert_eq!(store.hints().await?, vec![hint.clone()]);

        let listing = store.list_keys().await?;
        assert!(listing.primary_keys.is_empty());
        assert_eq!(listing.backup_keys.get(&NodeId::new(100)), Some(&vec!["k".to_string()]));
        assert_eq!(listing.backup_keys.get(&NodeId::new(10)), Some(&vec!["k".to_string()]));

        let older = VersionVector::from(vec![(100, 1)]);
        assert!(!store.remove_hint("k", NodeId::new(10), &older).await?, "hint moved on since");
        assert!(store.remove_hint("k", NodeId::new(10), &hint.version).await?);
        assert!(store.hints().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_user_key_cannot_reach_hint_slot() -> Result<()> {
        let store = store();
        let mut hint = record("hinted", &[(50, 1)]);
        hint.hint_for = Some(NodeId::new(10));
        store.apply(hint.clone()).await?;

        // A user key spelled like the hint slot of "k" still gets its own slot.
        let mut forged = record("forged", &[(50, 5)]);
        forged.key = hint_key("k", NodeId::new(10));
        store.apply(forged.clone()).await?;

        assert_eq!(store.load_hint("k", NodeId::new(10)).await?, Some(hint));
        assert_eq!(store.load(&forged.key).await?, Some(forged));
        assert_eq!(store.load("k").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_latest_falls_back_to_hints() -> Result<()> {
        let store = store();
        let mut hint = record("hinted", &[(50, 1)]);
        hint.hint_for = Some(NodeId::new(10));
        store.apply(hint).await?;
        let latest = store.latest("k").await?.unwrap();
        assert_eq!(latest.value, "hinted");
        assert_eq!(store.latest("missing").await?, None);
        assert_eq!(store.enumerate(Role::Backup).await?.len(), 1);
        assert!(store.enumerate(Role::Primary).await?.is_empty());
        Ok(())
    }
}
