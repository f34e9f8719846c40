use async_trait::async_trait;

use super::MessageHandler;
use crate::error::Result;
use crate::message::types::GetReplicaReport;
use crate::message::types::GetReplicaSend;
use crate::message::types::HandoffReport;
use crate::message::types::HandoffSend;
use crate::message::types::Message;
use crate::message::types::PutReplicaReport;
use crate::message::types::PutReplicaSend;
use crate::message::HandleMsg;

/// Store one replica with the version merge rule.
#[async_trait]
impl HandleMsg<PutReplicaSend> for MessageHandler {
    async fn handle(&self, msg: &PutReplicaSend) -> Result<Message> {
        tracing::debug!(
            "[{}] store replica of {} version {}",
            self.dht.id,
            msg.record.key,
            msg.record.version
        );
        let stored = self.storage.apply(msg.record.clone()).await?;
        Ok(PutReplicaReport {
            version: stored.version,
        }
        .into())
    }
}

/// Serve the local copy, falling back on hints.
#[async_trait]
impl HandleMsg<GetReplicaSend> for MessageHandler {
    async fn handle(&self, msg: &GetReplicaSend) -> Result<Message> {
        let record = self.storage.latest(&msg.key).await?;
        Ok(GetReplicaReport { record }.into())
    }
}

/// Take over a record held as a hint for this node.
#[async_trait]
impl HandleMsg<HandoffSend> for MessageHandler {
    async fn handle(&self, msg: &HandoffSend) -> Result<Message> {
        tracing::info!(
            "[{}] received handoff of {} from a substitute",
            self.dht.id,
            msg.record.key
        );
        let stored = self.handoff.accept(msg.record.clone()).await?;
        Ok(HandoffReport {
            key: stored.key,
            version: stored.version,
        }
        .into())
    }
}
