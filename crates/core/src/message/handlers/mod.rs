//! This module implemented message handler of a ring node.

use std::sync::Arc;

use async_trait::async_trait;

use crate::consistency::HintedHandoff;
use crate::dht::lookup::Routing;
use crate::dht::NodeId;
use crate::dht::PeerRing;
use crate::dht::PeerRingAction;
use crate::dht::PeerRingRemoteAction;
use crate::error::Error;
use crate::error::Result;
use crate::message::types::Message;
use crate::message::NotifyPredecessorSend;
use crate::storage::RecordStore;
use crate::swarm::transport::SwarmTransport;

/// Operator and handler for DHT maintenance
pub mod dht;
/// Operator and Handler for Storage
pub mod storage;

/// MessageHandler will manage resources.
#[derive(Clone)]
pub struct MessageHandler {
    transport: Arc<SwarmTransport>,
    dht: Arc<PeerRing>,
    storage: Arc<RecordStore>,
    handoff: HintedHandoff,
    routing: Routing,
}

/// Generic trait for handle message ,inspired by Actor-Model.
#[async_trait]
pub trait HandleMsg<T> {
    /// Message handler. Returns the reply; one-way messages are answered with a pong.
    async fn handle(&self, msg: &T) -> Result<Message>;
}

impl MessageHandler {
    /// Create a new MessageHandler instance.
    pub fn new(
        transport: Arc<SwarmTransport>,
        storage: Arc<RecordStore>,
        handoff: HintedHandoff,
        routing: Routing,
    ) -> Self {
        let dht = transport.dht.clone();
        Self {
            transport,
            dht,
            storage,
            handoff,
            routing,
        }
    }

    fn pong(&self) -> Message {
        crate::message::PongReport {
            node: self.dht.info(),
        }
        .into()
    }

    pub(crate) async fn handle_dht_events(&self, act: &PeerRingAction) -> Result<()> {
        match act {
            PeerRingAction::None | PeerRingAction::Some(_) => Ok(()),
            // A new successor is set, tell it about us.
            PeerRingAction::RemoteAction(next, PeerRingRemoteAction::Notify(_)) => {
                self.notify(*next).await
            }
            PeerRingAction::RemoteAction(..) => {
                tracing::debug!("ignore dht action {:?}", act);
                Ok(())
            }
        }
    }

    async fn notify(&self, target: NodeId) -> Result<()> {
        let Some(peer) = self.dht.peer(target)? else {
            return Err(Error::PeerUnreachable(target.to_string()));
        };
        self.transport
            .send(
                &peer,
                NotifyPredecessorSend {
                    node: self.dht.info(),
                }
                .into(),
            )
            .await
    }

    /// Dispatch a message to its handler.
    pub async fn handle_message(&self, msg: &Message) -> Result<Message> {
        tracing::debug!("[{}] handle {}", self.dht.id, msg);
        match msg {
            Message::FindSuccessorSend(msg) => self.handle(msg).await,
            Message::QueryForTopoInfoSend(msg) => self.handle(msg).await,
            Message::NotifyPredecessorSend(msg) => self.handle(msg).await,
            Message::JoinDHT(msg) => self.handle(msg).await,
            Message::QueryForAllNodesSend(msg) => self.handle(msg).await,
            Message::PingSend(msg) => self.handle(msg).await,
            Message::PutReplicaSend(msg) => self.handle(msg).await,
            Message::GetReplicaSend(msg) => self.handle(msg).await,
            Message::HandoffSend(msg) => self.handle(msg).await,
            _ => Err(Error::InvalidMessage("not a request")),
        }
    }
}
