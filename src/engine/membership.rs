//! Gossip membership for embedded members.
//!
//! A SWIM-like protocol over UDP. The locator is the seed: a server sends
//! `Join` to it and keeps re-sending until an `Ack` arrives, which marks the
//! server as joined. From then on members ping each other, suspect silent
//! peers and eventually declare them dead. Clients do not join; they send
//! `Discover` and read the `Members` reply.

use anyhow::Result;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::info;

use super::types::{GossipMessage, Node, NodeId, NodeState};
use crate::lifecycle::types::MemberRole;

const GOSSIP_INTERVAL: Duration = Duration::from_millis(500);
const FAILURE_DETECTION_INTERVAL: Duration = Duration::from_secs(2);
const SUSPECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEAD_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a dead member stays listed before it is forgotten.
pub const DEAD_EVICTION: Duration = Duration::from_secs(30);
const MAX_DATAGRAM: usize = 65536;

/// Identity the local member announces to the cluster.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub name: String,
    pub role: MemberRole,
    pub data_addr: Option<SocketAddr>,
}

pub struct MembershipService {
    pub local_node: Node,
    pub members: Arc<DashMap<NodeId, Node>>,
    socket: Arc<UdpSocket>,
    incarnation: Arc<RwLock<u64>>,
    seeds: Vec<SocketAddr>,
    joined: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MembershipService {
    pub async fn new(
        bind_addr: SocketAddr,
        identity: LocalIdentity,
        seeds: Vec<SocketAddr>,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let gossip_addr = socket.local_addr()?;
        let incarnation_counter = Arc::new(RwLock::new(1));
        let current_inc = *incarnation_counter.read().await;

        let local_node = Node {
            id: NodeId::new(),
            name: identity.name,
            role: identity.role,
            gossip_addr,
            data_addr: identity.data_addr,
            state: NodeState::Alive,
            incarnation: current_inc,
            last_seen: Some(Instant::now()),
        };

        let members = Arc::new(DashMap::new());
        members.insert(local_node.id.clone(), local_node.clone());

        let service = Arc::new(Self {
            local_node,
            members,
            socket: Arc::new(socket),
            incarnation: incarnation_counter,
            joined: AtomicBool::new(seeds.is_empty()),
            seeds,
            tasks: Mutex::new(Vec::new()),
        });

        if !service.seeds.is_empty() {
            info!("Joining cluster via {} seed(s)", service.seeds.len());
            let encoded = bincode::serialize(&GossipMessage::Join {
                node: service.local_node.clone(),
            })?;
            for seed in service.seeds.iter() {
                service.socket.send_to(&encoded, seed).await?;
                info!("Sent join request to {}", seed);
            }
        }

        Ok(service)
    }

    pub fn start(self: &Arc<Self>) {
        tracing::info!(
            "Starting membership for {} ({}) on {}",
            self.local_node.name,
            self.local_node.role,
            self.local_node.gossip_addr
        );

        let gossip_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.gossip_loop().await;
            })
        };

        let receive_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.receive_loop().await;
            })
        };

        let failure_detection_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.failure_detection_loop().await;
            })
        };

        self.tasks
            .lock()
            .extend([gossip_handle, receive_handle, failure_detection_handle]);
    }

    /// Announces departure and stops the background loops.
    pub async fn shutdown(&self) {
        let msg = GossipMessage::Leave {
            node_id: self.local_node.id.clone(),
        };
        self.broadcast_message(msg).await;

        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        tracing::info!("Membership for {} stopped", self.local_node.name);
    }

    /// True once a seed acknowledged us. Seed members are joined from the start.
    pub fn has_joined(&self) -> bool {
        self.joined.load(Ordering::SeqCst)
    }

    pub fn gossip_addr(&self) -> SocketAddr {
        self.local_node.gossip_addr
    }

    pub fn get_member(&self, id: &NodeId) -> Option<Node> {
        self.members.get(id).map(|entry| entry.value().clone())
    }

    pub fn get_alive_members(&self) -> Vec<Node> {
        self.members
            .iter()
            .filter(|entry| entry.value().state == NodeState::Alive)
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn gossip_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(GOSSIP_INTERVAL);

        loop {
            interval.tick().await;

            if !self.has_joined() {
                self.resend_join().await;
            }

            let alive_members: Vec<Node> = self
                .members
                .iter()
                .filter(|entry| {
                    entry.value().id != self.local_node.id
                        && entry.value().state == NodeState::Alive
                })
                .map(|entry| entry.value().clone())
                .collect();

            if alive_members.is_empty() {
                continue;
            }

            use rand::Rng;
            let idx = rand::thread_rng().gen_range(0..alive_members.len());
            let target = &alive_members[idx];

            let incarnation = *self.incarnation.read().await;
            let msg = GossipMessage::Ping {
                from: self.local_node.id.clone(),
                incarnation,
            };

            if let Ok(encoded) = bincode::serialize(&msg) {
                if let Err(e) = self.socket.send_to(&encoded, target.gossip_addr).await {
                    tracing::warn!("Failed to send ping to {}: {}", target.name, e);
                } else {
                    tracing::trace!("Sent ping to {}", target.name);
                }
            } else {
                tracing::error!("Failed to serialize GossipMessage::Ping");
            }
        }
    }

    async fn resend_join(&self) {
        let msg = GossipMessage::Join {
            node: self.local_node.clone(),
        };
        let Ok(encoded) = bincode::serialize(&msg) else {
            tracing::error!("Failed to serialize GossipMessage::Join");
            return;
        };
        for seed in self.seeds.iter() {
            if let Err(e) = self.socket.send_to(&encoded, seed).await {
                tracing::warn!("Failed to send join to {}: {}", seed, e);
            } else {
                tracing::debug!("Re-sent join request to {}", seed);
            }
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match bincode::deserialize::<GossipMessage>(&buf[..len]) {
                    Ok(msg) => {
                        if let Err(e) = self.handle_message(msg, src).await {
                            tracing::error!("Error handling message from {}: {}", src, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to deserialize message from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_message(&self, msg: GossipMessage, src: SocketAddr) -> Result<()> {
        match msg {
            GossipMessage::Ping { from, incarnation } => {
                self.handle_ping(from, incarnation, src).await?;
            }

            GossipMessage::Ack {
                from,
                incarnation,
                members,
            } => {
                self.handle_ack(from, incarnation, members).await?;
            }

            GossipMessage::Join { node } => {
                self.handle_join(node, src).await?;
            }

            GossipMessage::Suspect {
                node_id,
                incarnation,
            } => {
                self.handle_suspect(node_id, incarnation).await?;
            }

            GossipMessage::Alive {
                node_id,
                incarnation,
            } => {
                self.handle_alive(node_id, incarnation).await?;
            }

            GossipMessage::Leave { node_id } => {
                self.handle_leave(node_id);
            }

            GossipMessage::Discover => {
                self.handle_discover(src).await?;
            }

            GossipMessage::Members { .. } => {
                tracing::debug!("Ignoring member list from {}", src);
            }
        }

        Ok(())
    }

    async fn handle_ping(&self, from: NodeId, from_incarnation: u64, src: SocketAddr) -> Result<()> {
        tracing::trace!("Received ping from {:?}", from);

        if let Some(mut member) = self.members.get_mut(&from) {
            member.last_seen = Some(Instant::now());

            if from_incarnation > member.incarnation {
                member.incarnation = from_incarnation;
            }
        } else {
            tracing::debug!("Ping from unknown member {:?} at {}", from, src);
        }

        self.send_ack(src).await
    }

    async fn send_ack(&self, dest: SocketAddr) -> Result<()> {
        let all_members: Vec<Node> = self
            .members
            .iter()
            .filter(|entry| entry.value().state != NodeState::Dead)
            .map(|entry| entry.value().clone())
            .collect();

        let my_incarnation = *self.incarnation.read().await;
        let reply = GossipMessage::Ack {
            from: self.local_node.id.clone(),
            incarnation: my_incarnation,
            members: all_members,
        };

        let encoded = bincode::serialize(&reply)?;
        self.socket.send_to(&encoded, dest).await?;

        Ok(())
    }

    async fn handle_ack(&self, from: NodeId, from_incarnation: u64, members: Vec<Node>) -> Result<()> {
        tracing::trace!(
            "Received ack from {:?} (inc={}) with {} members",
            from,
            from_incarnation,
            members.len()
        );

        if !self.joined.swap(true, Ordering::SeqCst) {
            info!(
                "{} joined the distributed system ({} members)",
                self.local_node.name,
                members.len()
            );
        }

        if let Some(mut member) = self.members.get_mut(&from)
            && from_incarnation > member.incarnation
        {
            member.incarnation = from_incarnation;
        }
        if let Some(mut member) = self.members.get_mut(&from) {
            member.last_seen = Some(Instant::now());
        }

        for member in members {
            self.merge_member(member);
        }

        Ok(())
    }

    fn merge_member(&self, new_member: Node) {
        if new_member.id == self.local_node.id {
            return;
        }

        match self.members.get_mut(&new_member.id) {
            Some(mut existing) => {
                if new_member.incarnation > existing.incarnation {
                    tracing::debug!(
                        "Updating {}: inc {} -> {}",
                        new_member.name,
                        existing.incarnation,
                        new_member.incarnation,
                    );

                    existing.state = new_member.state;
                    existing.incarnation = new_member.incarnation;
                    existing.last_seen = Some(Instant::now());
                } else if new_member.incarnation == existing.incarnation
                    && new_member.state == NodeState::Alive
                    && existing.state == NodeState::Suspect
                {
                    tracing::info!("{} refuted suspicion", new_member.name);
                    existing.state = NodeState::Alive;
                    existing.last_seen = Some(Instant::now());
                }
            }
            // an evicted member must not come back through a stale peer
            None if new_member.state == NodeState::Dead => {}
            None => {
                tracing::info!(
                    "Discovered member {} ({}) at {}",
                    new_member.name,
                    new_member.role,
                    new_member.gossip_addr
                );

                let mut member_with_timestamp = new_member;
                member_with_timestamp.last_seen = Some(Instant::now());

                self.members
                    .insert(member_with_timestamp.id.clone(), member_with_timestamp);
            }
        }
    }

    async fn handle_suspect(&self, node_id: NodeId, incarnation: u64) -> Result<()> {
        if node_id == self.local_node.id {
            let my_incarnation = {
                let mut inc = self.incarnation.write().await;
                *inc = (*inc).max(incarnation) + 1;
                *inc
            };
            tracing::info!("Refuting suspicion with incarnation {}", my_incarnation);

            if let Some(mut me) = self.members.get_mut(&node_id) {
                me.incarnation = my_incarnation;
                me.state = NodeState::Alive;
                me.last_seen = Some(Instant::now());
            }

            let msg = GossipMessage::Alive {
                node_id,
                incarnation: my_incarnation,
            };
            self.broadcast_message(msg).await;
            return Ok(());
        }

        match self.members.get_mut(&node_id) {
            Some(mut existing) => {
                if incarnation >= existing.incarnation && existing.state == NodeState::Alive {
                    tracing::info!("Member {} at {} suspected", existing.name, existing.gossip_addr);
                    existing.state = NodeState::Suspect;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                tracing::debug!("Suspected node {:?} doesn't exist", node_id);
            }
        }

        Ok(())
    }

    async fn handle_alive(&self, node_id: NodeId, incarnation: u64) -> Result<()> {
        match self.members.get_mut(&node_id) {
            Some(mut existing) => {
                if incarnation > existing.incarnation {
                    tracing::info!(
                        "Member {} at {} is alive (inc={})",
                        existing.name,
                        existing.gossip_addr,
                        incarnation
                    );
                    existing.state = NodeState::Alive;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                } else if incarnation == existing.incarnation
                    && existing.state == NodeState::Suspect
                {
                    tracing::info!("Member {} refuted suspicion", existing.name);
                    existing.state = NodeState::Alive;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                tracing::debug!("Alive message for unknown node {:?}", node_id);
            }
        }

        Ok(())
    }

    async fn handle_join(&self, mut node: Node, src: SocketAddr) -> Result<()> {
        // members bound to a wildcard address are reachable at the datagram source
        if node.gossip_addr.ip().is_unspecified() {
            node.gossip_addr = SocketAddr::new(src.ip(), node.gossip_addr.port());
        }
        if let Some(data_addr) = node.data_addr
            && data_addr.ip().is_unspecified()
        {
            node.data_addr = Some(SocketAddr::new(src.ip(), data_addr.port()));
        }

        tracing::info!(
            "Member {} ({}) joining at {}",
            node.name,
            node.role,
            node.gossip_addr
        );

        node.state = NodeState::Alive;
        node.last_seen = Some(Instant::now());
        self.members.insert(node.id.clone(), node);

        tracing::info!("Cluster size now: {}", self.members.len());

        self.send_ack(src).await
    }

    fn handle_leave(&self, node_id: NodeId) {
        if let Some(mut member) = self.members.get_mut(&node_id) {
            tracing::info!("Member {} left the cluster", member.name);
            member.state = NodeState::Dead;
            member.last_seen = Some(Instant::now());
        }
    }

    async fn handle_discover(&self, src: SocketAddr) -> Result<()> {
        let members = self.get_alive_members();
        tracing::debug!("Discovery request from {} ({} alive members)", src, members.len());

        let encoded = bincode::serialize(&GossipMessage::Members { members })?;
        self.socket.send_to(&encoded, src).await?;
        Ok(())
    }

    async fn failure_detection_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(FAILURE_DETECTION_INTERVAL);

        loop {
            interval.tick().await;
            for msg in self.sweep_members(Instant::now()) {
                self.broadcast_message(msg).await;
            }
        }
    }

    /// One failure-detection pass as of `now`: silent members move
    /// Alive -> Suspect -> Dead, and members dead for longer than
    /// `DEAD_EVICTION` are dropped. Returns the suspicions to broadcast.
    pub fn sweep_members(&self, now: Instant) -> Vec<GossipMessage> {
        let mut suspicions = Vec::new();
        let mut evicted = Vec::new();

        for mut entry in self.members.iter_mut() {
            let member = entry.value_mut();

            if member.id == self.local_node.id {
                continue;
            }

            let Some(last_seen) = member.last_seen else {
                member.last_seen = Some(now);
                continue;
            };
            let elapsed = now.saturating_duration_since(last_seen);

            match member.state {
                NodeState::Alive => {
                    if elapsed > SUSPECT_TIMEOUT {
                        tracing::warn!(
                            "Member {} suspected (no contact for {:?})",
                            member.name,
                            elapsed
                        );

                        member.state = NodeState::Suspect;

                        suspicions.push(GossipMessage::Suspect {
                            node_id: member.id.clone(),
                            incarnation: member.incarnation,
                        });
                    }
                }

                NodeState::Suspect => {
                    if elapsed > DEAD_TIMEOUT {
                        tracing::warn!(
                            "Member {} declared dead (no contact for {:?})",
                            member.name,
                            elapsed
                        );
                        member.state = NodeState::Dead;
                        // eviction counts from the moment of death
                        member.last_seen = Some(now);
                    }
                }

                NodeState::Dead => {
                    if elapsed > DEAD_EVICTION {
                        evicted.push(member.id.clone());
                    }
                }
            }
        }

        for id in evicted {
            if let Some((_, member)) = self
                .members
                .remove_if(&id, |_, member| member.state == NodeState::Dead)
            {
                tracing::info!("Forgot departed member {} ({})", member.name, member.gossip_addr);
            }
        }

        suspicions
    }

    async fn broadcast_message(&self, msg: GossipMessage) {
        let Ok(encoded) = bincode::serialize(&msg) else {
            tracing::error!("Failed to serialize broadcast message");
            return;
        };

        let targets: Vec<Node> = self
            .members
            .iter()
            .filter(|entry| {
                entry.value().id != self.local_node.id && entry.value().state == NodeState::Alive
            })
            .map(|entry| entry.value().clone())
            .collect();

        for member in targets {
            if let Err(e) = self.socket.send_to(&encoded, member.gossip_addr).await {
                tracing::warn!("Failed to broadcast to {}: {}", member.name, e);
            }
        }
    }
}

/// Asks a locator for its alive members. Used by client caches, which never
/// join the gossip ring themselves.
pub async fn discover_members(locator: SocketAddr, timeout: Duration) -> Result<Vec<Node>> {
    let bind_addr: SocketAddr = if locator.is_ipv4() {
        "0.0.0.0:0".parse()?
    } else {
        "[::]:0".parse()?
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    let encoded = bincode::serialize(&GossipMessage::Discover)?;
    socket.send_to(&encoded, locator).await?;

    let mut buf = vec![0u8; MAX_DATAGRAM];
    let members = tokio::time::timeout(timeout, async {
        loop {
            let (len, src) = socket.recv_from(&mut buf).await?;
            match bincode::deserialize::<GossipMessage>(&buf[..len]) {
                Ok(GossipMessage::Members { members }) => return Ok::<_, anyhow::Error>(members),
                Ok(_) => tracing::debug!("Unexpected gossip reply from {}", src),
                Err(e) => tracing::warn!("Failed to deserialize reply from {}: {}", src, e),
            }
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("locator {} did not answer within {:?}", locator, timeout))??;

    Ok(members)
}
