//! Outbound calls on behalf of a node: timeouts and liveness bookkeeping.
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use crate::dht::NodeId;
use crate::dht::NodeInfo;
use crate::dht::PeerRing;
use crate::error::Error;
use crate::error::Result;
use crate::message::Message;
use crate::transport::SharedTransport;

/// Wraps the raw [crate::transport::Transport] of a node.
/// Every call is bounded by the rpc timeout. A peer that cannot be reached is marked
/// suspected-dead in the [PeerRing], and marked alive again on the next successful call.
pub struct SwarmTransport {
    transport: SharedTransport,
    pub(crate) dht: Arc<PeerRing>,
    timeout: Duration,
    newly_dead: Mutex<Vec<NodeId>>,
}

/// Errors meaning the peer did not answer, as opposed to answering with an error.
fn is_unreachable(e: &Error) -> bool {
    matches!(
        e,
        Error::ReplicaTimeout(_) | Error::PeerUnreachable(_) | Error::Transport(_)
    )
}

impl SwarmTransport {
    pub fn new(transport: SharedTransport, dht: Arc<PeerRing>, timeout: Duration) -> Self {
        Self {
            transport,
            dht,
            timeout,
            newly_dead: Mutex::new(vec![]),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Request an address directly, no liveness bookkeeping. Used before the
    /// peer is known, e.g. for the bootstrap node.
    pub async fn request_address(&self, address: &str, msg: Message) -> Result<Message> {
        match tokio::time::timeout(self.timeout, self.transport.request(address, msg)).await {
            Ok(Ok(Message::ErrorReport(e))) => Err(Error::RemoteError(e.reason)),
            Ok(ret) => ret,
            Err(_) => Err(Error::ReplicaTimeout(address.to_string())),
        }
    }

    /// Request a peer.
    pub async fn request(&self, peer: &NodeInfo, msg: Message) -> Result<Message> {
        let ret = self.request_address(&peer.address, msg).await;
        self.observe(peer, ret.as_ref().err())?;
        ret
    }

    /// Fire-and-forget to a peer.
    pub async fn send(&self, peer: &NodeInfo, msg: Message) -> Result<()> {
        let ret = match tokio::time::timeout(self.timeout, self.transport.send(&peer.address, msg))
            .await
        {
            Ok(ret) => ret,
            Err(_) => Err(Error::ReplicaTimeout(peer.address.clone())),
        };
        self.observe(peer, ret.as_ref().err())?;
        ret
    }

    fn observe(&self, peer: &NodeInfo, err: Option<&Error>) -> Result<()> {
        if peer.id == self.dht.id {
            return Ok(());
        }
        match err {
            Some(e) if is_unreachable(e) => {
                tracing::warn!("call to {} failed: {}", peer, e);
                if self.dht.mark_dead(peer.id)? {
                    self.newly_dead
                        .lock()
                        .map_err(|_| Error::DHTSyncLockError)?
                        .push(peer.id);
                }
            }
            Some(_) => {}
            None => {
                if self.dht.peer(peer.id)?.is_none() {
                    self.dht.add_peer(peer.clone())?;
                } else {
                    self.dht.mark_alive(peer.id)?;
                }
            }
        }
        Ok(())
    }

    /// Peers that went from alive to suspected-dead since the last call.
    pub fn take_newly_dead(&self) -> Result<Vec<NodeId>> {
        let mut dead = self
            .newly_dead
            .lock()
            .map_err(|_| Error::DHTSyncLockError)?;
        Ok(std::mem::take(&mut *dead))
    }
}
