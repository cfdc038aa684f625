//! Client cache whose regions are proxies onto server members.
//!
//! Server members are found by asking the locator (`Discover`). Every proxy
//! operation is an HTTP call to the internal region protocol of one of those
//! servers, falling back to the configured data server URL when discovery
//! finds nothing.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::membership::discover_members;
use super::protocol::{
    ENTRIES_SEGMENT, EntriesPage, EntryValue, INTERNAL_SEGMENT, PreviousValue, PutEntryRequest,
    REGIONS_SEGMENT, RegionSummary,
};
use super::types::{MemberInfo, Node, RegionEntry};
use super::{CacheHandle, Region};
use crate::config::BrowserSettings;
use crate::error::GridError;
use crate::lifecycle::types::{LocatorAddress, MemberRole};
use crate::region::resolver::RegionCategory;

const RETRY_ATTEMPTS: usize = 3;

/// Known server members and the HTTP plumbing to reach them.
pub struct ServerPool {
    locator: Option<LocatorAddress>,
    fallback_url: String,
    http_client: reqwest::Client,
    request_timeout: Duration,
    discovery_timeout: Duration,
    servers: RwLock<Vec<Node>>,
}

impl ServerPool {
    pub fn new(
        locator: Option<LocatorAddress>,
        fallback_url: &str,
        request_timeout: Duration,
        discovery_timeout: Duration,
    ) -> Self {
        Self {
            locator,
            fallback_url: fallback_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
            request_timeout,
            discovery_timeout,
            servers: RwLock::new(Vec::new()),
        }
    }

    pub fn from_settings(settings: &BrowserSettings) -> Self {
        Self::new(
            Some(settings.locator()),
            &settings.data_server_url,
            settings.request_timeout(),
            settings.discovery_timeout(),
        )
    }

    /// Asks the locator for alive server members. Keeps the previous list
    /// when the locator cannot be reached.
    pub async fn refresh(&self) -> usize {
        let Some(locator) = &self.locator else {
            return 0;
        };

        let discovered = match locator.resolve().await {
            Ok(addr) => discover_members(addr, self.discovery_timeout).await,
            Err(e) => Err(anyhow::anyhow!(e)),
        };

        match discovered {
            Ok(members) => {
                let servers: Vec<Node> = members
                    .into_iter()
                    .filter(|node| node.role == MemberRole::Server && node.data_addr.is_some())
                    .collect();
                tracing::debug!("Locator {} reported {} server(s)", locator, servers.len());
                let count = servers.len();
                *self.servers.write() = servers;
                count
            }
            Err(e) => {
                tracing::warn!("Server discovery through {} failed: {}", locator, e);
                self.servers.read().len()
            }
        }
    }

    pub fn known_members(&self) -> Vec<MemberInfo> {
        self.servers.read().iter().map(MemberInfo::from).collect()
    }

    async fn targets(&self) -> Vec<String> {
        if self.servers.read().is_empty() {
            self.refresh().await;
        }

        let mut targets: Vec<String> = self
            .servers
            .read()
            .iter()
            .filter_map(|node| node.data_addr)
            .map(|addr| format!("http://{}", addr))
            .collect();
        if !self.fallback_url.is_empty() && !targets.contains(&self.fallback_url) {
            targets.push(self.fallback_url.clone());
        }
        targets
    }

    fn build_url(base: &str, segments: &[&str], query: &[(&str, String)]) -> Result<Url, GridError> {
        let mut url = Url::parse(base)
            .map_err(|e| GridError::Configuration(format!("invalid server url {}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| GridError::Configuration(format!("server url {} cannot take a path", base)))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    async fn send_with_retry(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        attempts: usize,
    ) -> anyhow::Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            let mut request = self
                .http_client
                .request(method.clone(), url.clone())
                .timeout(self.request_timeout);
            if let Some(payload) = body {
                request = request.json(payload);
            }

            match request.send().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }

    /// Sends the request to the first reachable server.
    pub async fn request(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Response, GridError> {
        let targets = self.targets().await;
        if targets.is_empty() {
            return Err(GridError::RemoteCall("no data server is known".to_string()));
        }

        let mut last_error = None;
        for base in targets {
            let url = Self::build_url(&base, segments, query)?;
            match self
                .send_with_retry(method.clone(), url, body, RETRY_ATTEMPTS)
                .await
            {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    tracing::warn!("Data server {} unreachable: {}", base, e);
                    last_error = Some(e);
                }
            }
        }

        // force rediscovery on the next call
        self.servers.write().clear();
        Err(GridError::RemoteCall(format!(
            "Failed to connect to data server: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

/// Client-side cache. Holds proxy bindings only, never data.
pub struct ClientCache {
    name: String,
    pool: Arc<ServerPool>,
    regions: DashMap<String, Arc<ProxyRegion>>,
    closed: Arc<AtomicBool>,
}

impl ClientCache {
    pub fn new(name: &str, pool: Arc<ServerPool>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            pool,
            regions: DashMap::new(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Builds the cache and runs a first discovery round.
    pub async fn connect(settings: &BrowserSettings) -> Arc<Self> {
        let pool = Arc::new(ServerPool::from_settings(settings));
        let found = pool.refresh().await;
        tracing::info!(
            "Client cache {} connected through locator {} ({} server(s) known)",
            settings.member_name,
            settings.locator(),
            found
        );
        Self::new(&settings.member_name, pool)
    }

    fn check_open(&self) -> Result<(), GridError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GridError::CacheClosed);
        }
        Ok(())
    }
}

impl CacheHandle for ClientCache {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn root_region_names(&self) -> Result<BTreeSet<String>, GridError> {
        self.check_open()?;
        Ok(self.regions.iter().map(|entry| entry.key().clone()).collect())
    }

    fn region(&self, name: &str) -> Result<Option<Arc<dyn Region>>, GridError> {
        self.check_open()?;
        Ok(self
            .regions
            .get(name)
            .map(|entry| entry.value().clone() as Arc<dyn Region>))
    }

    fn bind_proxy_region(&self, name: &str) -> Result<Arc<dyn Region>, GridError> {
        self.check_open()?;
        match self.regions.entry(name.to_string()) {
            Entry::Occupied(_) => Err(GridError::RegionExists(name.to_string())),
            Entry::Vacant(slot) => {
                let region = Arc::new(ProxyRegion {
                    name: name.to_string(),
                    pool: self.pool.clone(),
                    cache_closed: self.closed.clone(),
                });
                slot.insert(region.clone());
                tracing::debug!("Bound proxy region {}", name);
                Ok(region)
            }
        }
    }

    /// Unbinds the local proxy. The remote region is untouched.
    fn destroy_region(&self, name: &str) -> Result<(), GridError> {
        self.check_open()?;
        self.regions
            .remove(name)
            .map(|_| tracing::debug!("Unbound proxy region {}", name))
            .ok_or_else(|| GridError::RegionNotFound(name.to_string()))
    }

    fn members(&self) -> Vec<MemberInfo> {
        self.pool.known_members()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.regions.clear();
            tracing::info!("Client cache {} closed", self.name);
        }
    }
}

/// Forwards every operation to the server hosting the region.
pub struct ProxyRegion {
    name: String,
    pool: Arc<ServerPool>,
    cache_closed: Arc<AtomicBool>,
}

impl ProxyRegion {
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        key: Option<&str>,
        entries: bool,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<T, GridError> {
        if self.cache_closed.load(Ordering::SeqCst) {
            return Err(GridError::CacheClosed);
        }

        let mut segments = vec![INTERNAL_SEGMENT, REGIONS_SEGMENT, self.name.as_str()];
        if entries || key.is_some() {
            segments.push(ENTRIES_SEGMENT);
        }
        if let Some(key) = key {
            segments.push(key);
        }

        let response = self.pool.request(method, &segments, query, body).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GridError::RegionNotFound(self.name.clone()));
        }
        if !status.is_success() {
            return Err(GridError::RemoteCall(format!(
                "data server answered {} for region {}",
                status, self.name
            )));
        }
        response.json::<T>().await.map_err(|e| {
            GridError::RemoteCall(format!("invalid response from data server: {}", e))
        })
    }

    async fn summary(&self) -> Result<RegionSummary, GridError> {
        self.call(Method::GET, None, false, &[], None).await
    }
}

#[async_trait]
impl Region for ProxyRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> RegionCategory {
        RegionCategory::Proxy
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, GridError> {
        let reply: EntryValue = self.call(Method::GET, Some(key), true, &[], None).await?;
        Ok(reply.value)
    }

    async fn put(&self, key: &str, value: Value) -> Result<Option<Value>, GridError> {
        let body = serde_json::to_value(PutEntryRequest { value })
            .map_err(|e| GridError::Engine(format!("cannot encode value: {}", e)))?;
        let reply: PreviousValue = self
            .call(Method::PUT, Some(key), true, &[], Some(&body))
            .await?;
        Ok(reply.previous)
    }

    async fn remove(&self, key: &str) -> Result<Option<Value>, GridError> {
        let reply: PreviousValue = self
            .call(Method::DELETE, Some(key), true, &[], None)
            .await?;
        Ok(reply.previous)
    }

    async fn keys(&self) -> Result<Vec<String>, GridError> {
        Ok(self.summary().await?.keys)
    }

    async fn size(&self) -> Result<usize, GridError> {
        Ok(self.summary().await?.size)
    }

    async fn entries(&self, offset: usize, limit: usize) -> Result<Vec<RegionEntry>, GridError> {
        let query = [("offset", offset.to_string()), ("limit", limit.to_string())];
        let page: EntriesPage = self.call(Method::GET, None, true, &query, None).await?;
        Ok(page.entries)
    }
}
