use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Instant;

use crate::lifecycle::types::MemberRole;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    Alive,
    Suspect,
    Dead,
}

/// A member of the distributed system as seen by the gossip layer.
///
/// `incarnation` is a logical clock used to order updates and let a member
/// refute a false "Suspect" claim about itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub role: MemberRole,
    pub gossip_addr: SocketAddr,
    /// HTTP address serving region data (server members only).
    pub data_addr: Option<SocketAddr>,
    pub state: NodeState,
    pub incarnation: u64,

    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

/// The wire protocol between members and clients.
///
/// - `Ping/Ack`: liveness checks and member list exchange.
/// - `Join`: a server registers with the locator; answered with `Ack`.
/// - `Suspect/Alive`: health changes.
/// - `Leave`: graceful departure.
/// - `Discover/Members`: a client asks the locator for the member list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipMessage {
    Ping {
        from: NodeId,
        incarnation: u64,
    },

    Ack {
        from: NodeId,
        incarnation: u64,
        members: Vec<Node>,
    },

    Join {
        node: Node,
    },

    Suspect {
        node_id: NodeId,
        incarnation: u64,
    },

    Alive {
        node_id: NodeId,
        incarnation: u64,
    },

    Leave {
        node_id: NodeId,
    },

    Discover,

    Members {
        members: Vec<Node>,
    },
}

/// Member summary reported by `/api/cluster/status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberInfo {
    pub id: String,
    pub name: String,
    pub host: String,
    pub role: MemberRole,
}

impl From<&Node> for MemberInfo {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.0.clone(),
            name: node.name.clone(),
            host: node.gossip_addr.ip().to_string(),
            role: node.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionEntry {
    pub key: String,
    pub value: Value,
}

/// Contents of `<member>.status.json` in the member's working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStatusFile {
    pub member_name: String,
    pub role: MemberRole,
    pub node_id: String,
    pub pid: u32,
    pub gossip_addr: SocketAddr,
    pub data_addr: Option<SocketAddr>,
    pub started_at_ms: u64,
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
