#![warn(missing_docs)]
//! This module defines the messages exchanged between nodes.
//! Most of the messages follow the Ping/Pong pattern, where there is a one-to-one correspondence between them,
//! such as xxxSend and xxxReport messages.

use serde::Deserialize;
use serde::Serialize;

use crate::consistency::VersionVector;
use crate::dht::NodeId;
use crate::dht::NodeInfo;
use crate::dht::TopoInfo;
use crate::storage::Record;

/// MessageType use to find successor in a chord ring.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FindSuccessorSend {
    /// id of target
    pub id: NodeId,
}

/// MessageType use to report the successor found, or the next hop to ask.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FindSuccessorReport {
    /// The owner of the id, when the receiver knows it.
    pub node: Option<NodeInfo>,
    /// A closer node to continue the lookup with.
    pub next: Option<NodeInfo>,
}

/// MessageType use to ask a node for its successor list and predecessor.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueryForTopoInfoSend;

/// MessageType report to origin with the topological info.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueryForTopoInfoReport {
    /// successors and predecessor of the receiver.
    pub info: TopoInfo,
}

/// MessageType use to tell a node that the sender may be its predecessor.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotifyPredecessorSend {
    /// the predecessor candidate.
    pub node: NodeInfo,
}

/// MessageType use to announce a node joining the ring.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JoinDHT {
    /// the new node.
    pub node: NodeInfo,
}

/// MessageType use to ask for every node the receiver knows.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueryForAllNodesSend;

/// Response of QueryForAllNodesSend.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AllNodesReport {
    /// every known node, dead ones included.
    pub nodes: Vec<NodeInfo>,
}

/// Liveness probe.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PingSend {
    /// the prober.
    pub from: NodeInfo,
}

/// Response of PingSend.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PongReport {
    /// the probed node.
    pub node: NodeInfo,
}

/// MessageType use to write one replica of a record.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PutReplicaSend {
    /// the record, `hint_for` set on sloppy substitutes.
    pub record: Record,
}

/// Acknowledgement of PutReplicaSend.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PutReplicaReport {
    /// version stored by the replica after the merge.
    pub version: VersionVector,
}

/// MessageType use to read one replica of a key.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GetReplicaSend {
    /// the key.
    pub key: String,
}

/// Response of GetReplicaSend.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GetReplicaReport {
    /// None if the replica has no copy.
    pub record: Option<Record>,
}

/// MessageType use to hand a hinted record back to the node it was written for.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HandoffSend {
    /// the record, `hint_for` already cleared.
    pub record: Record,
}

/// Acknowledgement of HandoffSend.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HandoffReport {
    /// the key taken over.
    pub key: String,
    /// version stored by the owner after the merge.
    pub version: VersionVector,
}

/// Sent back when a request could not be served.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ErrorReport {
    /// human readable reason.
    pub reason: String,
}

/// A collection MessageType use for unified management.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[non_exhaustive]
pub enum Message {
    /// Remote message of find successor
    FindSuccessorSend(FindSuccessorSend),
    /// Response of FindSuccessorSend
    FindSuccessorReport(FindSuccessorReport),
    /// Remote message of query topological info of a node.
    QueryForTopoInfoSend(QueryForTopoInfoSend),
    /// Response of QueryForTopoInfoSend
    QueryForTopoInfoReport(QueryForTopoInfoReport),
    /// Remote message of notify a predecessor, fire-and-forget.
    NotifyPredecessorSend(NotifyPredecessorSend),
    /// Join announcement, fire-and-forget.
    JoinDHT(JoinDHT),
    /// Remote message of query every known node.
    QueryForAllNodesSend(QueryForAllNodesSend),
    /// Response of QueryForAllNodesSend
    AllNodesReport(AllNodesReport),
    /// Liveness probe.
    PingSend(PingSend),
    /// Response of PingSend
    PongReport(PongReport),
    /// Replica write.
    PutReplicaSend(PutReplicaSend),
    /// Response of PutReplicaSend
    PutReplicaReport(PutReplicaReport),
    /// Replica read.
    GetReplicaSend(GetReplicaSend),
    /// Response of GetReplicaSend
    GetReplicaReport(GetReplicaReport),
    /// Hint transfer.
    HandoffSend(HandoffSend),
    /// Response of HandoffSend
    HandoffReport(HandoffReport),
    /// Failure of a request.
    ErrorReport(ErrorReport),
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

macro_rules! impl_from_for_message {
    ($($t:ident),* $(,)?) => {
        $(
            impl From<$t> for Message {
                fn from(msg: $t) -> Self {
                    Message::$t(msg)
                }
            }
        )*
    };
}

impl_from_for_message!(
    FindSuccessorSend,
    FindSuccessorReport,
    QueryForTopoInfoSend,
    QueryForTopoInfoReport,
    NotifyPredecessorSend,
    JoinDHT,
    QueryForAllNodesSend,
    AllNodesReport,
    PingSend,
    PongReport,
    PutReplicaSend,
    PutReplicaReport,
    GetReplicaSend,
    GetReplicaReport,
    HandoffSend,
    HandoffReport,
    ErrorReport,
);
