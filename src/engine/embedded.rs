//! In-process locator and server members.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::membership::{LocalIdentity, MembershipService};
use super::types::{MemberInfo, MemberStatusFile, RegionEntry, now_ms};
use super::{CacheEngine, CacheHandle, Region};
use crate::error::GridError;
use crate::lifecycle::types::{MemberRole, MemberSpec};
use crate::region::resolver::RegionCategory;

struct RunningMember {
    name: String,
    membership: Arc<MembershipService>,
    cache: Option<Arc<EmbeddedCache>>,
    status_file: PathBuf,
}

/// Engine for one embedded member. A locator only runs membership; a server
/// also hosts an `EmbeddedCache`.
#[derive(Default)]
pub struct EmbeddedEngine {
    running: RwLock<Option<RunningMember>>,
}

impl EmbeddedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Gossip address of the running member.
    pub fn gossip_addr(&self) -> Option<SocketAddr> {
        self.running
            .read()
            .as_ref()
            .map(|member| member.membership.gossip_addr())
    }

    pub fn is_running(&self) -> bool {
        self.running.read().is_some()
    }

    async fn seeds_for(spec: &MemberSpec) -> Result<Vec<SocketAddr>, GridError> {
        match spec.role {
            MemberRole::Locator => Ok(Vec::new()),
            MemberRole::Server => {
                let locator = spec.locator.as_ref().ok_or_else(|| {
                    GridError::Configuration(format!(
                        "server member {} has no locator address",
                        spec.member_name
                    ))
                })?;
                Ok(vec![locator.resolve().await?])
            }
            MemberRole::Client => Err(GridError::Engine(
                "client caches are not started as embedded members".to_string(),
            )),
        }
    }
}

async fn resolve_bind_addr(host: &str, port: u16) -> Result<SocketAddr, GridError> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| GridError::Engine(format!("cannot resolve bind address {}:{}: {}", host, port, e)))?
        .next()
        .ok_or_else(|| GridError::Engine(format!("bind address {}:{} has no address", host, port)))
}

fn write_status_file(path: &Path, status: &MemberStatusFile) -> Result<(), GridError> {
    let body = serde_json::to_vec_pretty(status)
        .map_err(|e| GridError::Engine(format!("cannot encode member status: {}", e)))?;
    std::fs::write(path, body)
        .map_err(|e| GridError::Engine(format!("cannot write {}: {}", path.display(), e)))
}

#[async_trait]
impl CacheEngine for EmbeddedEngine {
    async fn start_member(&self, spec: &MemberSpec) -> Result<(), GridError> {
        if self.is_running() {
            return Err(GridError::Engine(format!(
                "a member is already running in this engine ({})",
                spec.member_name
            )));
        }

        let seeds = Self::seeds_for(spec).await?;
        let bind_addr = resolve_bind_addr(&spec.bind_host, spec.port).await?;

        let identity = LocalIdentity {
            name: spec.member_name.clone(),
            role: spec.role,
            data_addr: spec.advertise_addr,
        };
        let membership = MembershipService::new(bind_addr, identity, seeds)
            .await
            .map_err(|e| {
                GridError::Engine(format!(
                    "failed to start {} {} on {}: {}",
                    spec.role, spec.member_name, bind_addr, e
                ))
            })?;
        membership.start();

        let status_file = spec
            .working_dir
            .join(format!("{}.status.json", spec.member_name));
        let status = MemberStatusFile {
            member_name: spec.member_name.clone(),
            role: spec.role,
            node_id: membership.local_node.id.0.clone(),
            pid: std::process::id(),
            gossip_addr: membership.gossip_addr(),
            data_addr: spec.advertise_addr,
            started_at_ms: now_ms(),
        };
        if let Err(e) = write_status_file(&status_file, &status) {
            membership.shutdown().await;
            return Err(e);
        }

        let cache = match spec.role {
            MemberRole::Server => Some(EmbeddedCache::new(&spec.member_name, membership.clone())),
            _ => None,
        };

        tracing::info!(
            "{} {} started (gossip={}, workdir={})",
            spec.role,
            spec.member_name,
            membership.gossip_addr(),
            spec.working_dir.display()
        );

        *self.running.write() = Some(RunningMember {
            name: spec.member_name.clone(),
            membership,
            cache,
            status_file,
        });
        Ok(())
    }

    async fn stop_member(&self) -> Result<(), GridError> {
        let Some(member) = self.running.write().take() else {
            return Ok(());
        };

        if let Some(cache) = &member.cache {
            cache.close();
        }
        member.membership.shutdown().await;

        match std::fs::remove_file(&member.status_file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(GridError::Engine(format!(
                    "member {} stopped but {} could not be removed: {}",
                    member.name,
                    member.status_file.display(),
                    e
                )));
            }
        }

        tracing::info!("Member {} stopped", member.name);
        Ok(())
    }

    fn active_instance(&self) -> Option<Arc<dyn CacheHandle>> {
        let guard = self.running.read();
        let member = guard.as_ref()?;
        let cache = member.cache.as_ref()?;
        if !member.membership.has_joined() || cache.is_closed() {
            return None;
        }
        Some(cache.clone() as Arc<dyn CacheHandle>)
    }
}

/// Region store of a server member.
pub struct EmbeddedCache {
    name: String,
    regions: DashMap<String, Arc<LocalRegion>>,
    closed: Arc<AtomicBool>,
    membership: Arc<MembershipService>,
}

impl EmbeddedCache {
    pub fn new(name: &str, membership: Arc<MembershipService>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            regions: DashMap::new(),
            closed: Arc::new(AtomicBool::new(false)),
            membership,
        })
    }

    fn check_open(&self) -> Result<(), GridError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GridError::CacheClosed);
        }
        Ok(())
    }
}

impl CacheHandle for EmbeddedCache {
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

    fn create_region(
        &self,
        name: &str,
        category: RegionCategory,
    ) -> Result<Arc<dyn Region>, GridError> {
        self.check_open()?;
        match self.regions.entry(name.to_string()) {
            Entry::Occupied(_) => Err(GridError::RegionExists(name.to_string())),
            Entry::Vacant(slot) => {
                let region = Arc::new(LocalRegion::new(name, category, self.closed.clone()));
                slot.insert(region.clone());
                tracing::info!("Created region {} ({})", name, category);
                Ok(region)
            }
        }
    }

    fn destroy_region(&self, name: &str) -> Result<(), GridError> {
        self.check_open()?;
        let (_, region) = self
            .regions
            .remove(name)
            .ok_or_else(|| GridError::RegionNotFound(name.to_string()))?;
        region.destroy();
        tracing::info!("Destroyed region {}", name);
        Ok(())
    }

    fn members(&self) -> Vec<MemberInfo> {
        self.membership
            .get_alive_members()
            .iter()
            .map(MemberInfo::from)
            .collect()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            for entry in self.regions.iter() {
                entry.value().destroy();
            }
            self.regions.clear();
            tracing::info!("Cache {} closed", self.name);
        }
    }
}

/// A region whose entries live in this process.
pub struct LocalRegion {
    name: String,
    category: RegionCategory,
    data: DashMap<String, Value>,
    cache_closed: Arc<AtomicBool>,
    destroyed: AtomicBool,
}

impl LocalRegion {
    fn new(name: &str, category: RegionCategory, cache_closed: Arc<AtomicBool>) -> Self {
        Self {
            name: name.to_string(),
            category,
            data: DashMap::new(),
            cache_closed,
            destroyed: AtomicBool::new(false),
        }
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.data.clear();
    }

    fn check_usable(&self) -> Result<(), GridError> {
        if self.cache_closed.load(Ordering::SeqCst) {
            return Err(GridError::CacheClosed);
        }
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(GridError::RegionNotFound(self.name.clone()));
        }
        Ok(())
    }

    fn sorted_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl Region for LocalRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> RegionCategory {
        self.category
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, GridError> {
        self.check_usable()?;
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: Value) -> Result<Option<Value>, GridError> {
        self.check_usable()?;
        Ok(self.data.insert(key.to_string(), value))
    }

    async fn remove(&self, key: &str) -> Result<Option<Value>, GridError> {
        self.check_usable()?;
        Ok(self.data.remove(key).map(|(_, value)| value))
    }

    async fn keys(&self) -> Result<Vec<String>, GridError> {
        self.check_usable()?;
        Ok(self.sorted_keys())
    }

    async fn size(&self) -> Result<usize, GridError> {
        self.check_usable()?;
        Ok(self.data.len())
    }

    async fn entries(&self, offset: usize, limit: usize) -> Result<Vec<RegionEntry>, GridError> {
        self.check_usable()?;
        Ok(self
            .sorted_keys()
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|key| {
                self.data.get(&key).map(|value| RegionEntry {
                    key: key.clone(),
                    value: value.value().clone(),
                })
            })
            .collect())
    }
}
