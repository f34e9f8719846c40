//! Hinted handoff: returning sloppy-quorum copies to the node they stand in for.
use std::sync::Arc;

use super::quorum::Coordinator;
use crate::dht::NodeId;
use crate::dht::PeerRing;
use crate::error::Error;
use crate::error::Result;
use crate::message::HandoffSend;
use crate::message::Message;
use crate::storage::Record;
use crate::storage::RecordStore;
use crate::storage::Role;
use crate::swarm::transport::SwarmTransport;

/// Hint bookkeeping of one node.
///
/// A hint is removed only after its target acknowledged the exact version that was
/// handed off, so a hint is delivered at least once and never silently dropped.
#[derive(Clone)]
pub struct HintedHandoff {
    transport: Arc<SwarmTransport>,
    storage: Arc<RecordStore>,
    coordinator: Coordinator,
}

impl HintedHandoff {
    pub fn new(
        transport: Arc<SwarmTransport>,
        storage: Arc<RecordStore>,
        coordinator: Coordinator,
    ) -> Self {
        Self {
            transport,
            storage,
            coordinator,
        }
    }

    fn dht(&self) -> &PeerRing {
        &self.transport.dht
    }

    /// Try to deliver every held hint whose target is believed alive.
    /// Returns the number of hints delivered.
    pub async fn drain(&self) -> Result<usize> {
        self.drain_where(|_| true).await
    }

    /// Deliver the hints held for one node, typically right after it came back.
    pub async fn drain_for(&self, target: NodeId) -> Result<usize> {
        self.drain_where(|id| id == target).await
    }

    async fn drain_where<F>(&self, filter: F) -> Result<usize>
    where F: Fn(NodeId) -> bool {
        let mut delivered = 0;
        for hint in self.storage.hints().await? {
            let Some(target) = hint.hint_for else {
                continue;
            };
            if !filter(target) || !self.dht().is_alive(target)? {
                continue;
            }
            match self.hand_off(target, hint).await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => tracing::debug!("handoff to {} postponed: {}", target, e),
            }
        }
        if delivered > 0 {
            tracing::info!("[{}] handed off {} hints", self.dht().id, delivered);
        }
        Ok(delivered)
    }

    /// Deliver one hint and drop it once acknowledged.
    async fn hand_off(&self, target: NodeId, hint: Record) -> Result<bool> {
        let key = hint.key.clone();
        let version = hint.version.clone();
        let record = Record {
            hint_for: None,
            ..hint
        };

        if target == self.dht().id {
            self.accept(record).await?;
        } else {
            let peer = self
                .dht()
                .peer(target)?
                .ok_or(Error::PeerUnreachable(target.to_string()))?;
            match self
                .transport
                .request(&peer, HandoffSend { record }.into())
                .await?
            {
                Message::HandoffReport(_) => {}
                _ => return Err(Error::InvalidMessage("HandoffReport")),
            }
        }
        self.storage.remove_hint(&key, target, &version).await
    }

    /// Store a handed-off record as the node's own copy.
    /// It is the primary copy when this node owns the key now.
    pub async fn accept(&self, record: Record) -> Result<Record> {
        let id = self.dht().space.hash_key(&record.key);
        let owner = self.dht().owner_of(id)?;
        let role = if owner.id == self.dht().id {
            Role::Primary
        } else {
            Role::Backup
        };
        self.storage
            .apply(Record {
                role,
                hint_for: None,
                ..record
            })
            .await
    }

    /// After `dead` was found down, copy the records this node owns to the
    /// substitutes that now stand in for it.
    pub async fn reassign(&self, dead: NodeId) -> Result<usize> {
        let mut moved = 0;
        for record in self.storage.enumerate(Role::Primary).await? {
            if record.is_hint() {
                continue;
            }
            let set = self.coordinator.replica_set_for(&record.key).await?;
            for target in set.targets.iter().filter(|t| t.hint_for == Some(dead)) {
                let hint = Record {
                    role: Role::Backup,
                    hint_for: Some(dead),
                    ..record.clone()
                };
                match self.coordinator.write_replica(&target.node, hint).await {
                    Ok(_) => moved += 1,
                    Err(e) => tracing::warn!(
                        "failed to reassign {} to {}: {}",
                        record.key,
                        target.node,
                        e
                    ),
                }
            }
        }
        if moved > 0 {
            tracing::info!(
                "[{}] reassigned {} records of dead node {}",
                self.dht().id,
                moved,
                dead
            );
        }
        Ok(moved)
    }
}
