//! Engine Module Tests
//!
//! ## Test Scopes
//! - **Wire Protocol**: gossip message encoding.
//! - **Membership**: locator/server join handshake, discovery and departure.
//! - **Embedded Engine**: member start/stop, status file, cache readiness.
//! - **Regions**: local region storage and proxy bindings.
//! - **Registry**: handle gating by lifecycle state.

#[cfg(test)]
mod tests {
    use crate::engine::client::{ClientCache, ServerPool};
    use crate::engine::embedded::{EmbeddedCache, EmbeddedEngine};
    use crate::engine::membership::{
        DEAD_EVICTION, LocalIdentity, MembershipService, discover_members,
    };
    use crate::engine::registry::CacheHandleRegistry;
    use crate::engine::types::{GossipMessage, Node, NodeId, NodeState};
    use crate::engine::{CacheEngine, CacheHandle};
    use crate::error::GridError;
    use crate::lifecycle::types::{
        LifecycleState, LocatorAddress, MemberRole, MemberSpec, StateCell,
    };
    use crate::region::resolver::RegionCategory;
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn identity(name: &str, role: MemberRole, data_addr: Option<SocketAddr>) -> LocalIdentity {
        LocalIdentity {
            name: name.to_string(),
            role,
            data_addr,
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..50 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        condition()
    }

    fn spec(
        role: MemberRole,
        name: &str,
        dir: &std::path::Path,
        locator: Option<LocatorAddress>,
    ) -> MemberSpec {
        MemberSpec {
            role,
            member_name: name.to_string(),
            bind_host: "127.0.0.1".to_string(),
            port: 0,
            working_dir: dir.to_path_buf(),
            locator,
            advertise_addr: Some("127.0.0.1:18080".parse().unwrap()),
        }
    }

    async fn standalone_cache(name: &str) -> Arc<EmbeddedCache> {
        let membership = MembershipService::new(
            loopback(),
            identity(name, MemberRole::Server, None),
            vec![],
        )
        .await
        .unwrap();
        EmbeddedCache::new(name, membership)
    }

    // ============================================================
    // WIRE PROTOCOL TESTS
    // ============================================================

    #[test]
    fn test_node_id_is_unique() {
        assert_ne!(NodeId::new(), NodeId::new());
    }

    #[test]
    fn test_join_message_keeps_identity_but_not_last_seen() {
        let node = Node {
            id: NodeId("server-1".to_string()),
            name: "data-server".to_string(),
            role: MemberRole::Server,
            gossip_addr: "127.0.0.1:5000".parse().unwrap(),
            data_addr: Some("127.0.0.1:8080".parse().unwrap()),
            state: NodeState::Alive,
            incarnation: 4,
            last_seen: Some(Instant::now()),
        };

        let encoded = bincode::serialize(&GossipMessage::Join { node }).unwrap();
        let decoded: GossipMessage = bincode::deserialize(&encoded).unwrap();

        match decoded {
            GossipMessage::Join { node } => {
                assert_eq!(node.name, "data-server");
                assert_eq!(node.role, MemberRole::Server);
                assert_eq!(node.data_addr, Some("127.0.0.1:8080".parse().unwrap()));
                assert_eq!(node.incarnation, 4);
                assert!(node.last_seen.is_none(), "last_seen is local-only");
            }
            other => panic!("Expected Join, got {:?}", other),
        }
    }

    // ============================================================
    // MEMBERSHIP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_locator_is_joined_from_the_start() {
        let locator = MembershipService::new(
            loopback(),
            identity("locator", MemberRole::Locator, None),
            vec![],
        )
        .await
        .unwrap();

        assert!(locator.has_joined());
        assert_eq!(locator.get_alive_members().len(), 1);
        assert_ne!(locator.gossip_addr().port(), 0, "ephemeral port is resolved");
    }

    #[tokio::test]
    async fn test_server_joins_locator_and_is_discoverable() {
        let locator = MembershipService::new(
            loopback(),
            identity("locator", MemberRole::Locator, None),
            vec![],
        )
        .await
        .unwrap();
        locator.start();

        let data_addr: SocketAddr = "127.0.0.1:18081".parse().unwrap();
        let server = MembershipService::new(
            loopback(),
            identity("server-1", MemberRole::Server, Some(data_addr)),
            vec![locator.gossip_addr()],
        )
        .await
        .unwrap();
        server.start();

        assert!(wait_until(|| server.has_joined()).await, "server should be acked");
        assert!(wait_until(|| locator.get_member(&server.local_node.id).is_some()).await);

        let members = discover_members(locator.gossip_addr(), Duration::from_secs(2))
            .await
            .unwrap();
        let found = members
            .iter()
            .find(|node| node.role == MemberRole::Server)
            .expect("server should be listed");
        assert_eq!(found.name, "server-1");
        assert_eq!(found.data_addr, Some(data_addr));

        server.shutdown().await;
        assert!(
            wait_until(|| {
                locator
                    .get_member(&server.local_node.id)
                    .map(|node| node.state == NodeState::Dead)
                    .unwrap_or(false)
            })
            .await,
            "Leave should mark the server dead"
        );

        locator.shutdown().await;
    }

    #[tokio::test]
    async fn test_discovery_times_out_without_locator() {
        // bound but never started, so nothing answers
        let silent = MembershipService::new(
            loopback(),
            identity("silent", MemberRole::Locator, None),
            vec![],
        )
        .await
        .unwrap();

        let result = discover_members(silent.gossip_addr(), Duration::from_millis(200)).await;

        assert!(result.is_err());
    }

    fn dead_node(index: usize) -> Node {
        Node {
            id: NodeId::new(),
            name: format!("old-server-{}", index),
            role: MemberRole::Server,
            gossip_addr: "127.0.0.1:9".parse().unwrap(),
            data_addr: Some("127.0.0.1:9".parse().unwrap()),
            state: NodeState::Dead,
            incarnation: 1,
            last_seen: Some(Instant::now()),
        }
    }

    #[tokio::test]
    async fn test_departed_member_is_forgotten_after_grace_period() {
        let locator = MembershipService::new(
            loopback(),
            identity("locator", MemberRole::Locator, None),
            vec![],
        )
        .await
        .unwrap();
        locator.start();

        let server = MembershipService::new(
            loopback(),
            identity("server-1", MemberRole::Server, None),
            vec![locator.gossip_addr()],
        )
        .await
        .unwrap();
        server.start();
        assert!(wait_until(|| server.has_joined()).await);
        let server_id = server.local_node.id.clone();

        server.shutdown().await;
        assert!(
            wait_until(|| {
                locator
                    .get_member(&server_id)
                    .map(|node| node.state == NodeState::Dead)
                    .unwrap_or(false)
            })
            .await
        );

        locator.sweep_members(Instant::now());
        assert!(locator.get_member(&server_id).is_some(), "kept during grace period");

        locator.sweep_members(Instant::now() + DEAD_EVICTION + Duration::from_secs(1));
        assert!(locator.get_member(&server_id).is_none());
        assert_eq!(locator.members.len(), 1, "only the locator itself remains");

        locator.shutdown().await;
    }

    #[tokio::test]
    async fn test_silent_member_is_suspected_then_dead() {
        let locator = MembershipService::new(
            loopback(),
            identity("locator", MemberRole::Locator, None),
            vec![],
        )
        .await
        .unwrap();
        let mut silent = dead_node(0);
        silent.state = NodeState::Alive;
        let silent_id = silent.id.clone();
        locator.members.insert(silent_id.clone(), silent);

        let start = Instant::now();
        let suspicions = locator.sweep_members(start + Duration::from_secs(6));
        assert!(matches!(
            suspicions.as_slice(),
            [GossipMessage::Suspect { node_id, .. }] if *node_id == silent_id
        ));
        assert_eq!(locator.get_member(&silent_id).unwrap().state, NodeState::Suspect);

        assert!(locator.sweep_members(start + Duration::from_secs(17)).is_empty());
        assert_eq!(locator.get_member(&silent_id).unwrap().state, NodeState::Dead);
    }

    #[tokio::test]
    async fn test_dead_members_do_not_block_new_joins() {
        let locator = MembershipService::new(
            loopback(),
            identity("locator", MemberRole::Locator, None),
            vec![],
        )
        .await
        .unwrap();
        // leftovers of many restarts, far more than one datagram could carry
        for index in 0..2000 {
            let node = dead_node(index);
            locator.members.insert(node.id.clone(), node);
        }
        locator.start();

        let server = MembershipService::new(
            loopback(),
            identity("server-1", MemberRole::Server, None),
            vec![locator.gossip_addr()],
        )
        .await
        .unwrap();
        server.start();

        assert!(wait_until(|| server.has_joined()).await, "ack must fit a datagram");
        assert!(
            server
                .members
                .iter()
                .all(|entry| entry.value().state != NodeState::Dead),
            "dead members are not gossiped"
        );

        server.shutdown().await;
        locator.shutdown().await;
    }

    // ============================================================
    // EMBEDDED ENGINE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_engine_starts_locator_and_server() {
        let dir = tempfile::tempdir().unwrap();

        let locator_engine = EmbeddedEngine::new();
        locator_engine
            .start_member(&spec(MemberRole::Locator, "locator", dir.path(), None))
            .await
            .unwrap();
        assert!(
            locator_engine.active_instance().is_none(),
            "a locator hosts no cache"
        );

        let locator_port = locator_engine.gossip_addr().unwrap().port();
        let server_engine = EmbeddedEngine::new();
        server_engine
            .start_member(&spec(
                MemberRole::Server,
                "server-1",
                dir.path(),
                Some(LocatorAddress::new("127.0.0.1", locator_port)),
            ))
            .await
            .unwrap();

        assert!(wait_until(|| server_engine.active_instance().is_some()).await);
        let status_file = dir.path().join("server-1.status.json");
        assert!(status_file.exists());

        let cache = server_engine.active_instance().unwrap();
        assert!(wait_until(|| cache.members().len() >= 2).await);

        server_engine.stop_member().await.unwrap();
        assert!(!status_file.exists(), "status file is removed on stop");
        assert!(cache.is_closed());
        assert!(server_engine.active_instance().is_none());

        locator_engine.stop_member().await.unwrap();
    }

    #[tokio::test]
    async fn test_engine_rejects_second_start() {
        let dir = tempfile::tempdir().unwrap();
        let engine = EmbeddedEngine::new();
        let locator = spec(MemberRole::Locator, "locator", dir.path(), None);

        engine.start_member(&locator).await.unwrap();
        let err = engine.start_member(&locator).await.unwrap_err();

        assert!(matches!(err, GridError::Engine(_)));
        engine.stop_member().await.unwrap();
    }

    #[tokio::test]
    async fn test_server_without_locator_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = EmbeddedEngine::new();

        let err = engine
            .start_member(&spec(MemberRole::Server, "server-1", dir.path(), None))
            .await
            .unwrap_err();

        assert!(matches!(err, GridError::Configuration(_)));
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_stop_without_member_is_noop() {
        let engine = EmbeddedEngine::new();
        assert!(engine.stop_member().await.is_ok());
    }

    // ============================================================
    // LOCAL REGION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_create_region_rejects_duplicates() {
        let cache = standalone_cache("server").await;

        cache.create_region("orders", RegionCategory::Replicate).unwrap();
        let err = cache
            .create_region("orders", RegionCategory::Partition)
            .err()
            .unwrap();

        assert!(matches!(err, GridError::RegionExists(name) if name == "orders"));
        let region = cache.region("orders").unwrap().unwrap();
        assert_eq!(region.category(), RegionCategory::Replicate);
        assert_eq!(region.full_path(), "/orders");
    }

    #[tokio::test]
    async fn test_local_region_operations() {
        let cache = standalone_cache("server").await;
        let region = cache.create_region("orders", RegionCategory::Partition).unwrap();

        assert_eq!(region.put("k2", json!("v2")).await.unwrap(), None);
        assert_eq!(region.put("k1", json!(1)).await.unwrap(), None);
        assert_eq!(region.put("k1", json!(2)).await.unwrap(), Some(json!(1)));

        assert_eq!(region.get("k1").await.unwrap(), Some(json!(2)));
        assert_eq!(region.get("missing").await.unwrap(), None);
        assert_eq!(region.keys().await.unwrap(), vec!["k1", "k2"]);
        assert_eq!(region.size().await.unwrap(), 2);

        let page = region.entries(1, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].key, "k2");

        assert_eq!(region.remove("k2").await.unwrap(), Some(json!("v2")));
        assert_eq!(region.remove("k2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_destroyed_region_is_not_found() {
        let cache = standalone_cache("server").await;
        let region = cache.create_region("orders", RegionCategory::Partition).unwrap();

        cache.destroy_region("orders").unwrap();

        assert!(matches!(
            region.get("k").await.unwrap_err(),
            GridError::RegionNotFound(_)
        ));
        assert!(cache.region("orders").unwrap().is_none());
        assert!(matches!(
            cache.destroy_region("orders").unwrap_err(),
            GridError::RegionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_closed_cache_reports_closed() {
        let cache = standalone_cache("server").await;
        let region = cache.create_region("orders", RegionCategory::Partition).unwrap();

        cache.close();

        assert!(cache.is_closed());
        assert!(matches!(cache.root_region_names().unwrap_err(), GridError::CacheClosed));
        assert!(matches!(region.get("k").await.unwrap_err(), GridError::CacheClosed));
    }

    // ============================================================
    // CLIENT CACHE TESTS
    // ============================================================

    fn offline_client() -> Arc<ClientCache> {
        let pool = ServerPool::new(
            None,
            "http://127.0.0.1:9",
            Duration::from_millis(100),
            Duration::from_millis(100),
        );
        ClientCache::new("browser", Arc::new(pool))
    }

    #[test]
    fn test_proxy_binding_is_exclusive() {
        let client = offline_client();

        let region = client.bind_proxy_region("orders").unwrap();
        assert_eq!(region.category(), RegionCategory::Proxy);

        assert!(matches!(
            client.bind_proxy_region("orders").err().unwrap(),
            GridError::RegionExists(_)
        ));
        assert_eq!(client.root_region_names().unwrap().len(), 1);
    }

    #[test]
    fn test_client_cannot_host_regions() {
        let client = offline_client();

        assert!(matches!(
            client.create_region("orders", RegionCategory::Partition).err().unwrap(),
            GridError::Engine(_)
        ));
    }

    #[test]
    fn test_destroy_unbinds_proxy() {
        let client = offline_client();
        client.bind_proxy_region("orders").unwrap();

        client.destroy_region("orders").unwrap();

        assert!(client.region("orders").unwrap().is_none());
        assert!(client.bind_proxy_region("orders").is_ok(), "name can be rebound");
    }

    #[tokio::test]
    async fn test_proxy_on_unreachable_server_is_remote_error() {
        let client = offline_client();
        let region = client.bind_proxy_region("orders").unwrap();

        let err = region.get("k1").await.unwrap_err();

        assert!(matches!(err, GridError::RemoteCall(msg) if msg.starts_with("Failed to connect")));
    }

    // ============================================================
    // REGISTRY TESTS
    // ============================================================

    #[test]
    fn test_registry_gates_on_owner_state() {
        let registry = CacheHandleRegistry::new();
        let state = Arc::new(StateCell::new(LifecycleState::Starting));
        let client = offline_client();

        assert!(registry.get_active().is_none());

        registry.publish(client.clone(), state.clone());
        assert!(registry.get_active().is_none(), "not running yet");

        state.set(LifecycleState::Running);
        assert!(registry.get_active().is_some());

        client.close();
        assert!(registry.get_active().is_none(), "closed handles are absent");
    }

    #[test]
    fn test_registry_invalidate_closes_handle() {
        let registry = CacheHandleRegistry::new();
        let state = Arc::new(StateCell::new(LifecycleState::Running));
        let client = offline_client();
        registry.publish(client.clone(), state);

        assert!(registry.invalidate());
        assert!(client.is_closed());
        assert!(registry.get_active().is_none());
        assert!(!registry.invalidate(), "second invalidate holds nothing");
        assert!(matches!(
            registry.require_active().err().unwrap(),
            GridError::CacheUnavailable
        ));
    }

    #[test]
    fn test_registry_release_ignores_other_owners() {
        let registry = CacheHandleRegistry::new();
        let owner = Arc::new(StateCell::new(LifecycleState::Running));
        let stranger = Arc::new(StateCell::new(LifecycleState::Running));
        let client = offline_client();
        registry.publish(client.clone(), owner.clone());

        assert!(!registry.release(&stranger));
        assert!(!client.is_closed());
        assert!(registry.get_active().is_some());

        assert!(registry.release(&owner));
        assert!(client.is_closed());
        assert!(registry.get_active().is_none());
    }
}
