//! Cache Engine Boundary
//!
//! The lifecycle and region layers only talk to the grid through the traits in
//! this module. The crate ships two implementations:
//!
//! - **`embedded`**: an in-process member (locator or server). Membership runs
//!   over the UDP gossip protocol in `membership`; a server member keeps its
//!   regions in memory.
//! - **`client`**: a client cache whose proxy regions hold no data and forward
//!   every operation over HTTP to a server member found through the locator.
//!
//! `registry` holds the handle that the rest of the process reads.

pub mod client;
pub mod embedded;
pub mod membership;
pub mod protocol;
pub mod registry;
pub mod types;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::GridError;
use crate::lifecycle::types::MemberSpec;
use crate::region::resolver::RegionCategory;
use types::{MemberInfo, RegionEntry};

/// Starts and stops one embedded member and exposes its cache once ready.
#[async_trait]
pub trait CacheEngine: Send + Sync {
    /// Blocks until the member is bound and registering. Fails on bind or
    /// network errors.
    async fn start_member(&self, spec: &MemberSpec) -> Result<(), GridError>;

    async fn stop_member(&self) -> Result<(), GridError>;

    /// The cache, once the member has joined the distributed system.
    fn active_instance(&self) -> Option<Arc<dyn CacheHandle>>;
}

/// A live cache instance: the set of root regions plus member metadata.
pub trait CacheHandle: Send + Sync {
    fn name(&self) -> String;

    fn is_closed(&self) -> bool;

    fn root_region_names(&self) -> Result<BTreeSet<String>, GridError>;

    fn region(&self, name: &str) -> Result<Option<Arc<dyn Region>>, GridError>;

    /// Binds a metadata-only region that forwards to a remotely hosted one.
    /// Fails with `RegionExists` when the name is already bound.
    fn bind_proxy_region(&self, name: &str) -> Result<Arc<dyn Region>, GridError> {
        let _ = name;
        Err(GridError::Engine(format!(
            "{} cannot bind proxy regions",
            self.name()
        )))
    }

    /// Creates a data-hosting region. Fails with `RegionExists` on collision.
    fn create_region(
        &self,
        name: &str,
        category: RegionCategory,
    ) -> Result<Arc<dyn Region>, GridError> {
        let _ = category;
        Err(GridError::Engine(format!(
            "{} cannot host region {}",
            self.name(),
            name
        )))
    }

    /// Removes the region from this cache. Fails with `RegionNotFound`.
    fn destroy_region(&self, name: &str) -> Result<(), GridError>;

    fn members(&self) -> Vec<MemberInfo>;

    fn close(&self);
}

/// Key/value operations on one region. Values are arbitrary JSON.
#[async_trait]
pub trait Region: Send + Sync {
    fn name(&self) -> &str;

    fn category(&self) -> RegionCategory;

    fn full_path(&self) -> String {
        format!("/{}", self.name())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, GridError>;

    /// Returns the previous value, if any.
    async fn put(&self, key: &str, value: Value) -> Result<Option<Value>, GridError>;

    async fn remove(&self, key: &str) -> Result<Option<Value>, GridError>;

    async fn keys(&self) -> Result<Vec<String>, GridError>;

    async fn size(&self) -> Result<usize, GridError>;

    async fn entries(&self, offset: usize, limit: usize) -> Result<Vec<RegionEntry>, GridError>;
}
