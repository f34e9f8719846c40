use std::ops::Deref;

use async_trait::async_trait;

use super::MessageHandler;
use crate::dht::lookup::Routing;
use crate::dht::Chord;
use crate::dht::PeerRingAction;
use crate::dht::PeerRingRemoteAction;
use crate::dht::TopoInfo;
use crate::error::Error;
use crate::error::Result;
use crate::message::types::AllNodesReport;
use crate::message::types::FindSuccessorReport;
use crate::message::types::FindSuccessorSend;
use crate::message::types::JoinDHT;
use crate::message::types::Message;
use crate::message::types::NotifyPredecessorSend;
use crate::message::types::PingSend;
use crate::message::types::PongReport;
use crate::message::types::QueryForAllNodesSend;
use crate::message::types::QueryForTopoInfoReport;
use crate::message::types::QueryForTopoInfoSend;
use crate::message::HandleMsg;

/// Answer with the owner, or with the next hop for finger routing.
#[async_trait]
impl HandleMsg<FindSuccessorSend> for MessageHandler {
    async fn handle(&self, msg: &FindSuccessorSend) -> Result<Message> {
        if self.routing == Routing::Full {
            return Ok(FindSuccessorReport {
                node: Some(self.dht.owner_of(msg.id)?),
                next: None,
            }
            .into());
        }
        let report = match self.dht.find_successor(msg.id)? {
            PeerRingAction::Some(id) => FindSuccessorReport {
                node: Some(self.dht.peer(id)?.unwrap_or_else(|| self.dht.info())),
                next: None,
            },
            PeerRingAction::RemoteAction(next, PeerRingRemoteAction::FindSuccessor(_)) => {
                FindSuccessorReport {
                    node: None,
                    next: Some(
                        self.dht
                            .peer(next)?
                            .ok_or(Error::PeerUnreachable(next.to_string()))?,
                    ),
                }
            }
            _ => return Err(Error::InvalidMessage("FindSuccessor action")),
        };
        Ok(report.into())
    }
}

#[async_trait]
impl HandleMsg<QueryForTopoInfoSend> for MessageHandler {
    async fn handle(&self, _msg: &QueryForTopoInfoSend) -> Result<Message> {
        let info = TopoInfo::try_from(self.dht.deref())?;
        Ok(QueryForTopoInfoReport { info }.into())
    }
}

/// The sender believes it is our predecessor.
#[async_trait]
impl HandleMsg<NotifyPredecessorSend> for MessageHandler {
    async fn handle(&self, msg: &NotifyPredecessorSend) -> Result<Message> {
        let ev = self.dht.join(msg.node.clone())?;
        self.dht.notify(msg.node.id)?;
        self.handle_dht_events(&ev).await?;
        Ok(self.pong())
    }
}

/// A new node announced itself.
#[async_trait]
impl HandleMsg<JoinDHT> for MessageHandler {
    async fn handle(&self, msg: &JoinDHT) -> Result<Message> {
        tracing::info!("[{}] {} joins the ring", self.dht.id, msg.node);
        let ev = self.dht.join(msg.node.clone())?;
        self.handle_dht_events(&ev).await?;
        Ok(self.pong())
    }
}

#[async_trait]
impl HandleMsg<QueryForAllNodesSend> for MessageHandler {
    async fn handle(&self, _msg: &QueryForAllNodesSend) -> Result<Message> {
        Ok(AllNodesReport {
            nodes: self.dht.peers()?,
        }
        .into())
    }
}

/// A ping is proof of life of the sender too.
#[async_trait]
impl HandleMsg<PingSend> for MessageHandler {
    async fn handle(&self, msg: &PingSend) -> Result<Message> {
        self.dht.mark_alive(msg.from.id)?;
        let ev = self.dht.join(msg.from.clone())?;
        self.handle_dht_events(&ev).await?;
        Ok(PongReport {
            node: self.dht.info(),
        }
        .into())
    }
}
