//! Client-side proxy reconciliation.
//!
//! A region created through the management API exists on the server before
//! this client knows about it. `ensure_proxied` closes that gap by binding a
//! local proxy under the same name; the composed `create_region` runs it after
//! a successful remote create and a short settle delay.

use std::sync::Arc;
use std::time::Duration;

use super::management::ManagementClient;
use super::protocol::RegionOperationResponse;
use crate::engine::Region;
use crate::engine::registry::CacheHandleRegistry;
use crate::error::GridError;

pub const MSG_CACHE_UNAVAILABLE: &str = "cache unavailable";
pub const MSG_ALREADY_PROXIED: &str = "already proxied";
pub const MSG_PROXY_CREATED: &str = "proxy created";

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub success: bool,
    pub message: String,
    pub warning: Option<String>,
}

impl ReconciliationResult {
    fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            warning: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            warning: None,
        }
    }
}

/// Proxy status of one region, computed on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionProxyState {
    pub name: String,
    pub is_proxied: bool,
    pub last_known_size: Option<usize>,
}

pub struct RegionProxyReconciler {
    registry: Arc<CacheHandleRegistry>,
    settle_delay: Duration,
}

impl RegionProxyReconciler {
    pub fn new(registry: Arc<CacheHandleRegistry>, settle_delay: Duration) -> Self {
        Self {
            registry,
            settle_delay,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn ensure_proxied(&self, name: &str) -> ReconciliationResult {
        let Some(handle) = self.registry.get_active() else {
            return ReconciliationResult::failed(MSG_CACHE_UNAVAILABLE);
        };

        match handle.root_region_names() {
            Ok(names) if names.contains(name) => {
                return ReconciliationResult::ok(MSG_ALREADY_PROXIED);
            }
            Ok(_) => {}
            Err(e) if e.is_unavailable() => {
                return ReconciliationResult::failed(MSG_CACHE_UNAVAILABLE);
            }
            Err(e) => return ReconciliationResult::failed(e.to_string()),
        }

        match handle.bind_proxy_region(name) {
            Ok(_) => {
                tracing::info!("Proxy for region {} created", name);
                ReconciliationResult::ok(MSG_PROXY_CREATED)
            }
            // lost a race with another caller binding the same name
            Err(GridError::RegionExists(_)) => ReconciliationResult::ok(MSG_ALREADY_PROXIED),
            Err(e) if e.is_unavailable() => ReconciliationResult::failed(MSG_CACHE_UNAVAILABLE),
            Err(e) => ReconciliationResult::failed(e.to_string()),
        }
    }

    /// Returns the proxy for `name`, binding it first when needed.
    pub fn proxied_region(&self, name: &str) -> Result<Arc<dyn Region>, GridError> {
        let handle = self.registry.require_active()?;
        if let Some(region) = handle.region(name)? {
            return Ok(region);
        }

        let result = self.ensure_proxied(name);
        if !result.success {
            if result.message == MSG_CACHE_UNAVAILABLE {
                return Err(GridError::CacheUnavailable);
            }
            return Err(GridError::Engine(format!(
                "Region not found and could not create proxy: {} - {}",
                name, result.message
            )));
        }

        handle
            .region(name)?
            .ok_or_else(|| GridError::RegionNotFound(name.to_string()))
    }

    /// Remote create followed by local reconciliation. A failed reconciliation
    /// does not fail the call; it is reported in `proxy_warning`.
    pub async fn create_region(
        &self,
        management: &dyn ManagementClient,
        name: &str,
        region_type: Option<&str>,
    ) -> RegionOperationResponse {
        let mut response = management.create_region(name, region_type).await;
        if !response.success {
            return response;
        }

        tokio::time::sleep(self.settle_delay).await;

        if let Some(warning) = self.reconcile_created(name).warning {
            tracing::warn!("Region {} created remotely but not proxied: {}", name, warning);
            response.proxy_warning = Some(warning);
        }
        response
    }

    /// Reconciliation for a region known to exist remotely. Always succeeds;
    /// a bind failure becomes the warning.
    pub fn reconcile_created(&self, name: &str) -> ReconciliationResult {
        let proxied = self.ensure_proxied(name);
        if proxied.success {
            return proxied;
        }
        ReconciliationResult {
            success: true,
            message: "region exists remotely".to_string(),
            warning: Some(format!(
                "Region created but proxy setup had issues: {}",
                proxied.message
            )),
        }
    }

    pub async fn proxy_state(&self, name: &str) -> RegionProxyState {
        let region = self
            .registry
            .get_active()
            .and_then(|handle| handle.region(name).ok().flatten());

        let last_known_size = match &region {
            Some(region) => region.size().await.ok(),
            None => None,
        };

        RegionProxyState {
            name: name.to_string(),
            is_proxied: region.is_some(),
            last_known_size,
        }
    }
}
