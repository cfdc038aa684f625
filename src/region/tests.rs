//! Region Module Tests
//!
//! ## Test Scopes
//! - **Type Resolution**: token matching and the `PARTITION` fallback.
//! - **Reconciliation**: idempotent proxy binding, races, remote create with
//!   settle delay and the warning path.
//! - **Services**: server-side region administration and data access.

#[cfg(test)]
mod tests {
    use crate::engine::client::{ClientCache, ServerPool};
    use crate::engine::embedded::EmbeddedCache;
    use crate::engine::membership::{LocalIdentity, MembershipService};
    use crate::engine::registry::CacheHandleRegistry;
    use crate::engine::types::MemberInfo;
    use crate::engine::{CacheHandle, Region};
    use crate::error::GridError;
    use crate::lifecycle::types::{LifecycleState, MemberRole, StateCell};
    use crate::region::data::DataService;
    use crate::region::management::{HttpManagementClient, ManagementClient};
    use crate::region::protocol::RegionOperationResponse;
    use crate::region::reconciler::{
        MSG_ALREADY_PROXIED, MSG_CACHE_UNAVAILABLE, MSG_PROXY_CREATED, RegionProxyReconciler,
    };
    use crate::region::resolver::{RegionCategory, RegionTypeResolver};
    use crate::region::service::{RegionCatalog, ServerRegionService};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::{Duration, Instant};

    // ============================================================
    // HELPERS
    // ============================================================

    /// Client cache wrapper that counts proxy binds.
    struct CountingHandle {
        inner: Arc<ClientCache>,
        binds: AtomicUsize,
        fail_binds: bool,
        names_delay: Duration,
    }

    impl CountingHandle {
        fn new() -> Self {
            let pool = ServerPool::new(None, "", Duration::from_millis(50), Duration::from_millis(50));
            Self {
                inner: ClientCache::new("browser", Arc::new(pool)),
                binds: AtomicUsize::new(0),
                fail_binds: false,
                names_delay: Duration::ZERO,
            }
        }

        fn bind_count(&self) -> usize {
            self.binds.load(Ordering::SeqCst)
        }
    }

    impl CacheHandle for CountingHandle {
        fn name(&self) -> String {
            self.inner.name()
        }

        fn is_closed(&self) -> bool {
            self.inner.is_closed()
        }

        fn root_region_names(&self) -> Result<BTreeSet<String>, GridError> {
            let names = self.inner.root_region_names();
            std::thread::sleep(self.names_delay);
            names
        }

        fn region(&self, name: &str) -> Result<Option<Arc<dyn Region>>, GridError> {
            self.inner.region(name)
        }

        fn bind_proxy_region(&self, name: &str) -> Result<Arc<dyn Region>, GridError> {
            self.binds.fetch_add(1, Ordering::SeqCst);
            if self.fail_binds {
                return Err(GridError::Engine("pool has no servers".to_string()));
            }
            self.inner.bind_proxy_region(name)
        }

        fn destroy_region(&self, name: &str) -> Result<(), GridError> {
            self.inner.destroy_region(name)
        }

        fn members(&self) -> Vec<MemberInfo> {
            self.inner.members()
        }

        fn close(&self) {
            self.inner.close()
        }
    }

    fn published(handle: Arc<dyn CacheHandle>) -> Arc<CacheHandleRegistry> {
        let registry = CacheHandleRegistry::new();
        registry.publish(handle, Arc::new(StateCell::new(LifecycleState::Running)));
        registry
    }

    struct FakeManagement {
        response: RegionOperationResponse,
        calls: AtomicUsize,
    }

    impl FakeManagement {
        fn answering(response: RegionOperationResponse) -> Self {
            Self {
                response,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ManagementClient for FakeManagement {
        async fn create_region(
            &self,
            _name: &str,
            _region_type: Option<&str>,
        ) -> RegionOperationResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }

        async fn delete_region(&self, _name: &str) -> RegionOperationResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    async fn server_registry() -> (Arc<CacheHandleRegistry>, Arc<EmbeddedCache>) {
        let membership = MembershipService::new(
            "127.0.0.1:0".parse().unwrap(),
            LocalIdentity {
                name: "data-server".to_string(),
                role: MemberRole::Server,
                data_addr: None,
            },
            vec![],
        )
        .await
        .unwrap();
        let cache = EmbeddedCache::new("data-server", membership);
        (published(cache.clone()), cache)
    }

    // ============================================================
    // TYPE RESOLUTION TESTS
    // ============================================================

    #[test]
    fn test_every_supported_token_resolves_in_any_case() {
        for category in RegionCategory::SUPPORTED {
            let upper = category.as_str();
            let lower = upper.to_lowercase();
            let mixed: String = upper
                .chars()
                .enumerate()
                .map(|(i, c)| if i % 2 == 0 { c.to_ascii_lowercase() } else { c })
                .collect();

            assert_eq!(RegionTypeResolver::resolve(Some(upper)), category);
            assert_eq!(RegionTypeResolver::resolve(Some(&lower)), category);
            assert_eq!(RegionTypeResolver::resolve(Some(&mixed)), category);
        }
    }

    #[test]
    fn test_missing_or_unknown_tokens_default_to_partition() {
        assert_eq!(RegionTypeResolver::resolve(None), RegionCategory::Partition);
        assert_eq!(RegionTypeResolver::resolve(Some("")), RegionCategory::Partition);
        assert_eq!(RegionTypeResolver::resolve(Some("   ")), RegionCategory::Partition);
        assert_eq!(RegionTypeResolver::resolve(Some("REPLICATED")), RegionCategory::Partition);
        assert_eq!(
            RegionTypeResolver::resolve(Some("PROXY")),
            RegionCategory::Partition,
            "proxy is a client binding, not a server topology"
        );
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert_eq!(
            RegionTypeResolver::resolve(Some(" replicate ")),
            RegionCategory::Replicate
        );
    }

    // ============================================================
    // RECONCILIATION TESTS
    // ============================================================

    #[test]
    fn test_ensure_proxied_without_cache() {
        let reconciler = RegionProxyReconciler::new(CacheHandleRegistry::new(), Duration::ZERO);

        let result = reconciler.ensure_proxied("orders");

        assert!(!result.success);
        assert_eq!(result.message, MSG_CACHE_UNAVAILABLE);
    }

    #[test]
    fn test_second_ensure_short_circuits() {
        let handle = Arc::new(CountingHandle::new());
        let reconciler = RegionProxyReconciler::new(published(handle.clone()), Duration::ZERO);

        let first = reconciler.ensure_proxied("orders");
        let second = reconciler.ensure_proxied("orders");

        assert!(first.success);
        assert_eq!(first.message, MSG_PROXY_CREATED);
        assert!(second.success);
        assert_eq!(second.message, MSG_ALREADY_PROXIED);
        assert_eq!(handle.bind_count(), 1, "no second bind");
    }

    #[test]
    fn test_concurrent_ensure_binds_once() {
        let mut handle = CountingHandle::new();
        handle.names_delay = Duration::from_millis(50);
        let handle = Arc::new(handle);
        let reconciler = RegionProxyReconciler::new(published(handle.clone()), Duration::ZERO);
        let barrier = Barrier::new(2);

        let results: Vec<_> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..2)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        reconciler.ensure_proxied("orders")
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert!(results.iter().all(|r| r.success));
        assert_eq!(handle.root_region_names().unwrap().len(), 1);
        assert!(handle.region("orders").unwrap().is_some());
    }

    #[test]
    fn test_bind_failure_is_reported() {
        let mut handle = CountingHandle::new();
        handle.fail_binds = true;
        let reconciler = RegionProxyReconciler::new(published(Arc::new(handle)), Duration::ZERO);

        let result = reconciler.ensure_proxied("orders");

        assert!(!result.success);
        assert!(result.message.contains("pool has no servers"));
    }

    #[tokio::test]
    async fn test_create_region_waits_then_proxies() {
        let handle = Arc::new(CountingHandle::new());
        let reconciler =
            RegionProxyReconciler::new(published(handle.clone()), Duration::from_millis(50));
        let management = FakeManagement::answering(RegionOperationResponse::created(
            "orders",
            RegionCategory::Replicate,
        ));

        let started = Instant::now();
        let response = reconciler
            .create_region(&management, "orders", Some("REPLICATE"))
            .await;

        assert!(started.elapsed() >= Duration::from_millis(50), "settle delay applies");
        assert!(response.success);
        assert_eq!(response.region_type.as_deref(), Some("REPLICATE"));
        assert!(response.proxy_warning.is_none());
        assert_eq!(handle.bind_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_remote_create_skips_reconciliation() {
        let handle = Arc::new(CountingHandle::new());
        let reconciler =
            RegionProxyReconciler::new(published(handle.clone()), Duration::from_secs(5));
        let management =
            FakeManagement::answering(RegionOperationResponse::failed("Region already exists: orders"));

        let started = Instant::now();
        let response = reconciler.create_region(&management, "orders", None).await;

        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Region already exists: orders"));
        assert_eq!(handle.bind_count(), 0);
        assert!(started.elapsed() < Duration::from_secs(1), "no settle delay");
    }

    #[tokio::test]
    async fn test_proxy_failure_becomes_warning() {
        let mut handle = CountingHandle::new();
        handle.fail_binds = true;
        let reconciler = RegionProxyReconciler::new(published(Arc::new(handle)), Duration::ZERO);
        let management = FakeManagement::answering(RegionOperationResponse::created(
            "orders",
            RegionCategory::Partition,
        ));

        let response = reconciler.create_region(&management, "orders", None).await;

        assert!(response.success, "remote create already happened");
        let warning = response.proxy_warning.expect("warning attached");
        assert!(warning.starts_with("Region created but proxy setup had issues:"));
    }

    #[tokio::test]
    async fn test_unreachable_management_api() {
        let handle = Arc::new(CountingHandle::new());
        let reconciler = RegionProxyReconciler::new(published(handle.clone()), Duration::ZERO);
        let management = HttpManagementClient::new("http://127.0.0.1:9", Duration::from_millis(500));

        let response = reconciler
            .create_region(&management, "orders", Some("REPLICATE"))
            .await;

        assert!(!response.success);
        assert!(
            response
                .error
                .as_deref()
                .unwrap_or_default()
                .starts_with("Failed to connect to data server")
        );
        assert_eq!(handle.bind_count(), 0, "proxy bind never invoked");
    }

    #[tokio::test]
    async fn test_proxy_state() {
        let handle = Arc::new(CountingHandle::new());
        let reconciler = RegionProxyReconciler::new(published(handle.clone()), Duration::ZERO);

        let before = reconciler.proxy_state("orders").await;
        reconciler.ensure_proxied("orders");
        let after = reconciler.proxy_state("orders").await;

        assert!(!before.is_proxied);
        assert!(after.is_proxied);
        // nothing serves the proxy, so its size is unknown
        assert_eq!(after.last_known_size, None);
    }

    // ============================================================
    // SERVER REGION SERVICE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_server_create_and_delete() {
        let (registry, _cache) = server_registry().await;
        let service = ServerRegionService::new(registry);

        let created = service.create_region("orders", Some("replicate")).await;
        assert!(created.success);
        assert_eq!(created.message.as_deref(), Some("Region created successfully: orders"));
        assert_eq!(created.region_name.as_deref(), Some("orders"));
        assert_eq!(created.region_type.as_deref(), Some("REPLICATE"));

        let duplicate = service.create_region("orders", None).await;
        assert!(!duplicate.success);
        assert_eq!(duplicate.error.as_deref(), Some("Region already exists: orders"));

        assert_eq!(service.list_names().await, vec!["orders"]);
        let info = service.region_info("orders").await.unwrap();
        assert_eq!(info.full_path, "/orders");
        assert_eq!(info.size, Some(0));
        assert_eq!(info.is_proxied, None, "servers host, they do not proxy");

        let deleted = service.delete_region("orders").await;
        assert!(deleted.success);
        assert_eq!(deleted.message.as_deref(), Some("Region deleted successfully: orders"));

        let missing = service.delete_region("orders").await;
        assert!(!missing.success);
        assert_eq!(missing.error.as_deref(), Some("Region not found: orders"));
    }

    #[tokio::test]
    async fn test_server_unknown_type_defaults() {
        let (registry, _cache) = server_registry().await;
        let service = ServerRegionService::new(registry);

        let created = service.create_region("events", Some("PARTITON")).await;

        assert!(created.success);
        assert_eq!(created.region_type.as_deref(), Some("PARTITION"));
    }

    #[tokio::test]
    async fn test_server_without_cache() {
        let service = ServerRegionService::new(CacheHandleRegistry::new());

        let response = service.create_region("orders", None).await;

        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Cache is not available"));
        assert!(service.list_names().await.is_empty());
        assert!(matches!(
            service.region_info("orders").await.unwrap_err(),
            GridError::CacheUnavailable
        ));
    }

    // ============================================================
    // DATA SERVICE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_data_roundtrip_on_hosted_region() {
        let (registry, cache) = server_registry().await;
        cache.create_region("orders", RegionCategory::Partition).unwrap();
        let data = DataService::hosted(registry);

        let missing = data.get("orders", "k1").await.unwrap();
        assert!(!missing.exists);
        assert_eq!(missing.value, serde_json::Value::Null);

        data.put("orders", "k1", json!("v1")).await.unwrap();
        data.put("orders", "k2", json!({"qty": 2})).await.unwrap();

        let found = data.get("orders", "k1").await.unwrap();
        assert!(found.exists);
        assert_eq!(found.value, json!("v1"));

        let page = data.list("orders", Some(1), Some(1)).await.unwrap();
        assert_eq!(page.size, 2);
        assert_eq!(page.keys, vec!["k1", "k2"]);
        assert_eq!(page.returned_count, 1);
        assert_eq!(page.entries[0].key, "k2");

        let deleted = data.delete("orders", "k1").await.unwrap();
        assert_eq!(deleted.removed_value, Some(json!("v1")));
        let again = data.delete("orders", "k1").await.unwrap();
        assert_eq!(again.removed_value, None);
    }

    #[tokio::test]
    async fn test_data_on_missing_region() {
        let (registry, _cache) = server_registry().await;
        let data = DataService::hosted(registry);

        let err = data.get("nope", "k1").await.unwrap_err();

        assert!(matches!(err, GridError::RegionNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_proxied_data_binds_on_demand() {
        let handle = Arc::new(CountingHandle::new());
        let registry = published(handle.clone());
        let reconciler = Arc::new(RegionProxyReconciler::new(registry.clone(), Duration::ZERO));
        let data = DataService::proxied(registry, reconciler);

        // no server behind the pool, but the binding still happens first
        let err = data.get("orders", "k1").await.unwrap_err();

        assert!(matches!(err, GridError::RemoteCall(_)));
        assert_eq!(handle.bind_count(), 1);
        assert!(handle.region("orders").unwrap().is_some());
    }
}
