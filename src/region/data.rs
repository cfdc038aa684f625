use serde_json::Value;
use std::sync::Arc;

use super::protocol::{
    DEFAULT_PAGE_LIMIT, DeleteDataResponse, GetDataResponse, PutDataResponse, RegionDataResponse,
};
use super::reconciler::RegionProxyReconciler;
use crate::engine::Region;
use crate::engine::registry::CacheHandleRegistry;
use crate::error::GridError;

/// Key/value access to regions. With a reconciler (browser side) a region that
/// is not bound yet gets a proxy on first use.
pub struct DataService {
    registry: Arc<CacheHandleRegistry>,
    reconciler: Option<Arc<RegionProxyReconciler>>,
}

impl DataService {
    pub fn hosted(registry: Arc<CacheHandleRegistry>) -> Self {
        Self {
            registry,
            reconciler: None,
        }
    }

    pub fn proxied(
        registry: Arc<CacheHandleRegistry>,
        reconciler: Arc<RegionProxyReconciler>,
    ) -> Self {
        Self {
            registry,
            reconciler: Some(reconciler),
        }
    }

    fn region(&self, name: &str) -> Result<Arc<dyn Region>, GridError> {
        if let Some(reconciler) = &self.reconciler {
            return reconciler.proxied_region(name);
        }
        self.registry
            .require_active()?
            .region(name)?
            .ok_or_else(|| GridError::RegionNotFound(name.to_string()))
    }

    pub async fn list(
        &self,
        name: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<RegionDataResponse, GridError> {
        let region = self.region(name)?;
        let keys = region.keys().await?;
        let entries = region
            .entries(offset.unwrap_or(0), limit.unwrap_or(DEFAULT_PAGE_LIMIT))
            .await?;

        Ok(RegionDataResponse {
            success: true,
            region: name.to_string(),
            size: keys.len(),
            keys,
            returned_count: entries.len(),
            entries,
        })
    }

    pub async fn get(&self, name: &str, key: &str) -> Result<GetDataResponse, GridError> {
        let value = self.region(name)?.get(key).await?;
        Ok(GetDataResponse {
            success: true,
            region: name.to_string(),
            key: key.to_string(),
            exists: value.is_some(),
            value: value.unwrap_or(Value::Null),
        })
    }

    pub async fn put(
        &self,
        name: &str,
        key: &str,
        value: Value,
    ) -> Result<PutDataResponse, GridError> {
        self.region(name)?.put(key, value).await?;
        tracing::debug!("Put {} into {}", key, name);
        Ok(PutDataResponse {
            success: true,
            message: "Data put successfully".to_string(),
            region: name.to_string(),
            key: key.to_string(),
        })
    }

    pub async fn delete(&self, name: &str, key: &str) -> Result<DeleteDataResponse, GridError> {
        let removed_value = self.region(name)?.remove(key).await?;
        Ok(DeleteDataResponse {
            success: true,
            message: "Data deleted successfully".to_string(),
            region: name.to_string(),
            key: key.to_string(),
            removed_value,
        })
    }
}
