//! Stabilization run daemons to maintain dht.

use std::sync::Arc;
use std::time::Duration;

use futures_timer::Delay;
use tokio_util::sync::CancellationToken;

use crate::consistency::HintedHandoff;
use crate::dht::lookup::Routing;
use crate::dht::successor::SuccessorReader;
use crate::dht::Chord;
use crate::dht::NodeInfo;
use crate::dht::PeerRing;
use crate::dht::SuccessorLookup;
use crate::dht::TopoInfo;
use crate::error::Error;
use crate::error::Result;
use crate::message::Message;
use crate::message::NotifyPredecessorSend;
use crate::message::PingSend;
use crate::message::QueryForAllNodesSend;
use crate::message::QueryForTopoInfoSend;
use crate::swarm::transport::SwarmTransport;

/// The stabilization runner.
#[derive(Clone)]
pub struct Stabilizer {
    transport: Arc<SwarmTransport>,
    dht: Arc<PeerRing>,
    lookup: Arc<dyn SuccessorLookup>,
    handoff: HintedHandoff,
    routing: Routing,
}

impl Stabilizer {
    /// Create a new stabilization runner.
    pub fn new(
        transport: Arc<SwarmTransport>,
        lookup: Arc<dyn SuccessorLookup>,
        handoff: HintedHandoff,
        routing: Routing,
    ) -> Self {
        let dht = transport.dht.clone();
        Self {
            transport,
            dht,
            lookup,
            handoff,
            routing,
        }
    }

    /// Run stabilization once. A failing step is logged and the next one still runs.
    pub async fn stabilize(&self) -> Result<()> {
        tracing::debug!("STABILIZATION stabilize_successor start");
        if let Err(e) = self.stabilize_successor().await {
            tracing::error!("[stabilize] Failed on stabilize successor {:?}", e);
        }
        tracing::debug!("STABILIZATION check_predecessor start");
        if let Err(e) = self.check_predecessor().await {
            tracing::error!("[stabilize] Failed on check predecessor {:?}", e);
        }
        match self.routing {
            Routing::Finger => {
                tracing::debug!("STABILIZATION fix_fingers start");
                if let Err(e) = self.fix_fingers().await {
                    tracing::error!("[stabilize] Failed on fix_finger {:?}", e);
                }
            }
            Routing::Full => {
                tracing::debug!("STABILIZATION sync_peers start");
                if let Err(e) = self.sync_peers().await {
                    tracing::error!("[stabilize] Failed on sync peers {:?}", e);
                }
            }
        }
        tracing::debug!("STABILIZATION probe_suspected start");
        if let Err(e) = self.probe_suspected().await {
            tracing::error!("[stabilize] Failed on probe suspected peers {:?}", e);
        }
        tracing::debug!("STABILIZATION reassign start");
        if let Err(e) = self.reassign_dead().await {
            tracing::error!("[stabilize] Failed on reassign {:?}", e);
        }
        tracing::debug!("STABILIZATION handoff start");
        if let Err(e) = self.handoff.drain().await {
            tracing::error!("[stabilize] Failed on hinted handoff {:?}", e);
        }
        tracing::debug!("STABILIZATION end");
        Ok(())
    }

    async fn query_topo(&self, node: &NodeInfo) -> Result<TopoInfo> {
        match self
            .transport
            .request(node, QueryForTopoInfoSend.into())
            .await?
        {
            Message::QueryForTopoInfoReport(r) => Ok(r.info),
            _ => Err(Error::InvalidMessage("QueryForTopoInfoReport")),
        }
    }

    /// First alive peer clockwise after self, if any.
    fn closest_alive_peer(&self) -> Result<Option<NodeInfo>> {
        let start = self.dht.space.id(self.dht.id.as_u64().wrapping_add(1));
        Ok(self
            .dht
            .walk(start, usize::MAX)?
            .into_iter()
            .find(|p| p.alive && p.id != self.dht.id))
    }

    /// Ask the successor for its predecessor and successor list, adopt a closer
    /// successor if one appeared, refresh the successor list, then notify the successor.
    pub async fn stabilize_successor(&self) -> Result<()> {
        let mut successor = self.dht.successor()?;
        if successor.id == self.dht.id {
            // Alone in the successor list: fall back on the predecessor or any known peer.
            let candidate = match self.dht.predecessor()? {
                Some(p) if p.id != self.dht.id && p.alive => Some(p),
                _ => self.closest_alive_peer()?,
            };
            match candidate {
                Some(c) => {
                    tracing::info!("STABILIZATION {} adopts successor {}", self.dht.id, c);
                    self.dht.join(c.clone())?;
                    successor = c;
                }
                None => return Ok(()),
            }
        }

        let mut info = self.query_topo(&successor).await?;
        if let Some(x) = info.predecessor.clone() {
            if x.id != self.dht.id
                && x.id != successor.id
                && self.dht.is_alive(x.id)?
                && self.dht.space.between(self.dht.id, x.id, successor.id)
            {
                match self.query_topo(&x).await {
                    Ok(x_info) => {
                        tracing::info!(
                            "STABILIZATION {} successor moves from {} to {}",
                            self.dht.id,
                            successor.id,
                            x.id
                        );
                        self.dht.join(x.clone())?;
                        successor = x;
                        info = x_info;
                    }
                    Err(e) => tracing::warn!("closer successor {} not reachable: {}", x, e),
                }
            }
        }

        self.dht.reset_successors(successor.id, &info.successors)?;
        self.transport
            .send(
                &successor,
                NotifyPredecessorSend {
                    node: self.dht.info(),
                }
                .into(),
            )
            .await
    }

    /// Ping the predecessor; clear it if it does not answer.
    pub async fn check_predecessor(&self) -> Result<()> {
        let Some(pred) = self.dht.predecessor()? else {
            return Ok(());
        };
        if pred.id == self.dht.id {
            return Ok(());
        }
        if let Err(e) = self.ping(&pred).await {
            tracing::warn!("STABILIZATION predecessor {} is gone: {}", pred, e);
            let current = *self.dht.lock_predecessor()?;
            if current == Some(pred.id) {
                self.dht.clear_predecessor()?;
            }
        }
        Ok(())
    }

    /// Refresh one finger entry per round.
    async fn fix_fingers(&self) -> Result<()> {
        let (index, start) = self.dht.next_finger()?;
        let owner = self.lookup.find_successor(start).await?;
        tracing::debug!("STABILIZATION fix_fingers: [{}] {} -> {}", index, start, owner.id);
        self.dht.set_finger(index, owner.id)
    }

    /// Full-ring view: learn nodes the successor knows about and this node does not.
    async fn sync_peers(&self) -> Result<()> {
        let successor = self.dht.successor()?;
        if successor.id == self.dht.id {
            return Ok(());
        }
        let nodes = match self
            .transport
            .request(&successor, QueryForAllNodesSend.into())
            .await?
        {
            Message::AllNodesReport(r) => r.nodes,
            _ => return Err(Error::InvalidMessage("AllNodesReport")),
        };
        for n in nodes {
            if n.id != self.dht.id && n.alive && self.dht.peer(n.id)?.is_none() {
                self.dht.join(n)?;
            }
        }
        Ok(())
    }

    /// Ping peers suspected dead. Those that answer are back on the ring and get
    /// their hints right away.
    async fn probe_suspected(&self) -> Result<()> {
        let suspected: Vec<NodeInfo> = self
            .dht
            .peers()?
            .into_iter()
            .filter(|p| !p.alive)
            .collect();
        for peer in suspected {
            if self.ping(&peer).await.is_ok() {
                tracing::info!("STABILIZATION {} recovered", peer);
                self.dht.join(peer.clone())?;
                self.handoff.drain_for(peer.id).await?;
            }
        }
        Ok(())
    }

    /// Move data of owned keys to substitutes of nodes found dead since the last round.
    async fn reassign_dead(&self) -> Result<()> {
        for dead in self.transport.take_newly_dead()? {
            self.handoff.reassign(dead).await?;
        }
        Ok(())
    }

    async fn ping(&self, peer: &NodeInfo) -> Result<()> {
        match self
            .transport
            .request(
                peer,
                PingSend {
                    from: self.dht.info(),
                }
                .into(),
            )
            .await?
        {
            Message::PongReport(_) => Ok(()),
            _ => Err(Error::InvalidMessage("PongReport")),
        }
    }

    /// Run stabilization in a loop until `cancel` fires.
    pub async fn wait(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("stabilizer of {} stopped", self.dht.id);
                    break;
                }
                _ = Delay::new(interval) => self
                    .stabilize()
                    .await
                    .unwrap_or_else(|e| tracing::error!("failed to stabilize {:?}", e)),
            }
        }
    }
}
