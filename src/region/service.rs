use async_trait::async_trait;
use std::sync::Arc;

use super::management::ManagementClient;
use super::protocol::{RegionInfo, RegionOperationResponse};
use super::reconciler::RegionProxyReconciler;
use super::resolver::RegionTypeResolver;
use crate::engine::Region;
use crate::engine::registry::CacheHandleRegistry;
use crate::error::GridError;

/// Region administration as seen by the REST layer. Implemented by the
/// server member (regions hosted locally) and by the browser (regions hosted
/// remotely, reached through proxies).
#[async_trait]
pub trait RegionCatalog: Send + Sync {
    async fn list_names(&self) -> Vec<String>;

    async fn list_info(&self) -> Vec<RegionInfo>;

    async fn region_info(&self, name: &str) -> Result<RegionInfo, GridError>;

    async fn create_region(&self, name: &str, region_type: Option<&str>)
    -> RegionOperationResponse;

    async fn delete_region(&self, name: &str) -> RegionOperationResponse;
}

async fn describe(region: &Arc<dyn Region>) -> RegionInfo {
    let (size, size_error) = match region.size().await {
        Ok(size) => (Some(size), None),
        Err(e) => (None, Some(e.to_string())),
    };
    RegionInfo {
        name: region.name().to_string(),
        full_path: region.full_path(),
        region_type: region.category(),
        size,
        size_error,
        is_proxied: None,
    }
}

async fn describe_all(regions: Vec<Arc<dyn Region>>) -> Vec<RegionInfo> {
    let mut infos = Vec::with_capacity(regions.len());
    for region in regions.iter() {
        infos.push(describe(region).await);
    }
    infos
}

fn cached_regions(registry: &CacheHandleRegistry) -> Vec<Arc<dyn Region>> {
    let Some(handle) = registry.get_active() else {
        return Vec::new();
    };
    let Ok(names) = handle.root_region_names() else {
        return Vec::new();
    };
    names
        .iter()
        .filter_map(|name| handle.region(name).ok().flatten())
        .collect()
}

/// Regions hosted by this server member.
pub struct ServerRegionService {
    registry: Arc<CacheHandleRegistry>,
}

impl ServerRegionService {
    pub fn new(registry: Arc<CacheHandleRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl RegionCatalog for ServerRegionService {
    async fn list_names(&self) -> Vec<String> {
        self.registry
            .get_active()
            .and_then(|handle| handle.root_region_names().ok())
            .map(|names| names.into_iter().collect())
            .unwrap_or_default()
    }

    async fn list_info(&self) -> Vec<RegionInfo> {
        describe_all(cached_regions(&self.registry)).await
    }

    async fn region_info(&self, name: &str) -> Result<RegionInfo, GridError> {
        let handle = self.registry.require_active()?;
        let region = handle
            .region(name)?
            .ok_or_else(|| GridError::RegionNotFound(name.to_string()))?;
        Ok(describe(&region).await)
    }

    async fn create_region(
        &self,
        name: &str,
        region_type: Option<&str>,
    ) -> RegionOperationResponse {
        let Some(handle) = self.registry.get_active() else {
            return RegionOperationResponse::failed(GridError::CacheUnavailable.to_string());
        };

        let category = RegionTypeResolver::resolve(region_type);
        match handle.create_region(name, category) {
            Ok(_) => RegionOperationResponse::created(name, category),
            Err(e @ GridError::RegionExists(_)) => RegionOperationResponse::failed(e.to_string()),
            Err(e) if e.is_unavailable() => {
                RegionOperationResponse::failed(GridError::CacheUnavailable.to_string())
            }
            Err(e) => {
                tracing::error!("Failed to create region {}: {}", name, e);
                RegionOperationResponse::failed(format!("Failed to create region: {}", e))
            }
        }
    }

    async fn delete_region(&self, name: &str) -> RegionOperationResponse {
        let Some(handle) = self.registry.get_active() else {
            return RegionOperationResponse::failed(GridError::CacheUnavailable.to_string());
        };

        match handle.destroy_region(name) {
            Ok(()) => RegionOperationResponse::deleted(name),
            Err(e @ GridError::RegionNotFound(_)) => RegionOperationResponse::failed(e.to_string()),
            Err(e) if e.is_unavailable() => {
                RegionOperationResponse::failed(GridError::CacheUnavailable.to_string())
            }
            Err(e) => {
                tracing::error!("Failed to delete region {}: {}", name, e);
                RegionOperationResponse::failed(format!("Failed to delete region: {}", e))
            }
        }
    }
}

/// Regions of the browser's client cache. Creates and deletes go to the
/// server's management API; reads bind proxies on demand.
pub struct ClientRegionService {
    registry: Arc<CacheHandleRegistry>,
    reconciler: Arc<RegionProxyReconciler>,
    management: Arc<dyn ManagementClient>,
}

impl ClientRegionService {
    pub fn new(
        registry: Arc<CacheHandleRegistry>,
        reconciler: Arc<RegionProxyReconciler>,
        management: Arc<dyn ManagementClient>,
    ) -> Self {
        Self {
            registry,
            reconciler,
            management,
        }
    }
}

#[async_trait]
impl RegionCatalog for ClientRegionService {
    async fn list_names(&self) -> Vec<String> {
        self.registry
            .get_active()
            .and_then(|handle| handle.root_region_names().ok())
            .map(|names| names.into_iter().collect())
            .unwrap_or_default()
    }

    async fn list_info(&self) -> Vec<RegionInfo> {
        describe_all(cached_regions(&self.registry)).await
    }

    async fn region_info(&self, name: &str) -> Result<RegionInfo, GridError> {
        let region = self.reconciler.proxied_region(name)?;
        let state = self.reconciler.proxy_state(name).await;
        // no size means the server could not answer; ask again for the error
        let size = match state.last_known_size {
            Some(size) => size,
            None => region.size().await?,
        };
        Ok(RegionInfo {
            name: region.name().to_string(),
            full_path: region.full_path(),
            region_type: region.category(),
            size: Some(size),
            size_error: None,
            is_proxied: Some(state.is_proxied),
        })
    }

    async fn create_region(
        &self,
        name: &str,
        region_type: Option<&str>,
    ) -> RegionOperationResponse {
        self.reconciler
            .create_region(self.management.as_ref(), name, region_type)
            .await
    }

    async fn delete_region(&self, name: &str) -> RegionOperationResponse {
        let response = self.management.delete_region(name).await;
        if response.success
            && let Some(handle) = self.registry.get_active()
        {
            match handle.destroy_region(name) {
                Ok(()) => tracing::info!("Proxy for region {} removed", name),
                Err(GridError::RegionNotFound(_)) => {}
                Err(e) => tracing::warn!("Could not unbind proxy {}: {}", name, e),
            }
        }
        response
    }
}
