use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use super::poller::ReadinessPoller;
use super::types::{LifecycleState, LocatorAddress, MemberRole, MemberSpec, StateCell};
use super::workdir::WorkingDirectoryResolver;
use super::{Lifecycle, PHASE_MEMBER};
use crate::config::{LocatorSettings, ServerSettings, Settings};
use crate::engine::CacheEngine;
use crate::engine::registry::CacheHandleRegistry;
use crate::error::GridError;

/// Per-member inputs, taken from the `locator` or `server` settings section.
#[derive(Debug, Clone)]
pub struct MemberConfig {
    pub enabled: bool,
    pub member_name: String,
    pub working_dir: String,
    pub host: String,
    pub port: u16,
    pub locator: Option<LocatorAddress>,
    pub advertise_addr: Option<SocketAddr>,
}

impl MemberConfig {
    pub fn for_locator(settings: &LocatorSettings) -> Self {
        Self {
            enabled: settings.enabled,
            member_name: settings.member_name.clone(),
            working_dir: settings.working_dir.clone(),
            host: settings.host.clone(),
            port: settings.port,
            locator: None,
            advertise_addr: None,
        }
    }

    /// `advertise_addr` is where this process serves region data over HTTP.
    pub fn for_server(settings: &ServerSettings, advertise_addr: Option<SocketAddr>) -> Self {
        Self {
            enabled: settings.enabled,
            member_name: settings.member_name.clone(),
            working_dir: settings.working_dir.clone(),
            host: settings.host.clone(),
            port: settings.port,
            locator: Some(settings.locator()),
            advertise_addr,
        }
    }
}

/// Drives one embedded locator or server member.
pub struct ClusterMemberLifecycle {
    role: MemberRole,
    config: MemberConfig,
    engine: Arc<dyn CacheEngine>,
    registry: Arc<CacheHandleRegistry>,
    resolver: WorkingDirectoryResolver,
    poller: ReadinessPoller,
    state: Arc<StateCell>,
}

impl ClusterMemberLifecycle {
    pub fn new(
        role: MemberRole,
        config: MemberConfig,
        engine: Arc<dyn CacheEngine>,
        registry: Arc<CacheHandleRegistry>,
    ) -> Self {
        Self {
            role,
            config,
            engine,
            registry,
            resolver: WorkingDirectoryResolver::default(),
            poller: ReadinessPoller::new(20, std::time::Duration::from_millis(500)),
            state: Arc::new(StateCell::default()),
        }
    }

    pub fn locator(
        settings: &Settings,
        engine: Arc<dyn CacheEngine>,
        registry: Arc<CacheHandleRegistry>,
    ) -> Self {
        Self::new(
            MemberRole::Locator,
            MemberConfig::for_locator(&settings.locator),
            engine,
            registry,
        )
        .with_resolver(WorkingDirectoryResolver::from_settings(&settings.workdir))
    }

    pub fn server(
        settings: &Settings,
        advertise_addr: Option<SocketAddr>,
        engine: Arc<dyn CacheEngine>,
        registry: Arc<CacheHandleRegistry>,
    ) -> Self {
        Self::new(
            MemberRole::Server,
            MemberConfig::for_server(&settings.server, advertise_addr),
            engine,
            registry,
        )
        .with_resolver(WorkingDirectoryResolver::from_settings(&settings.workdir))
        .with_poller(ReadinessPoller::from_settings(&settings.server.readiness))
    }

    pub fn with_resolver(mut self, resolver: WorkingDirectoryResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_poller(mut self, poller: ReadinessPoller) -> Self {
        self.poller = poller.describing(format!("cache of {}", self.config.member_name));
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn role(&self) -> MemberRole {
        self.role
    }

    fn build_spec(&self, working_dir: PathBuf) -> MemberSpec {
        let is_server = self.role == MemberRole::Server;
        MemberSpec {
            role: self.role,
            member_name: self.config.member_name.clone(),
            bind_host: self.config.host.clone(),
            port: self.config.port,
            working_dir,
            locator: if is_server {
                self.config.locator.clone()
            } else {
                None
            },
            advertise_addr: if is_server {
                self.config.advertise_addr
            } else {
                None
            },
        }
    }

    async fn launch(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), GridError> {
        let working_dir = match self.resolver.resolve_and_ensure(&self.config.working_dir) {
            Ok(dir) => dir,
            Err(e) => {
                self.state.set(LifecycleState::Stopped);
                return Err(e);
            }
        };

        let spec = self.build_spec(working_dir);
        if let Some(locator) = &spec.locator {
            tracing::info!("{} registering with locator {}", spec.member_name, locator);
        }

        if let Err(e) = self.engine.start_member(&spec).await {
            self.state.set(LifecycleState::Stopped);
            return Err(e);
        }

        if self.role == MemberRole::Server {
            let engine = self.engine.clone();
            // a timeout or cancellation leaves the lifecycle in Starting
            let handle = self
                .poller
                .poll(
                    || {
                        let engine = engine.clone();
                        async move { Ok(engine.active_instance()) }
                    },
                    &mut shutdown,
                )
                .await?;
            self.registry.publish(handle, self.state.clone());
        }

        self.state.set(LifecycleState::Running);
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for ClusterMemberLifecycle {
    fn name(&self) -> &str {
        &self.config.member_name
    }

    fn phase(&self) -> i32 {
        PHASE_MEMBER
    }

    async fn start(&self, shutdown: watch::Receiver<bool>) -> Result<(), GridError> {
        if !self.config.enabled {
            tracing::info!("{} {} is disabled", self.role, self.config.member_name);
            return Ok(());
        }

        if !self
            .state
            .transition(LifecycleState::Stopped, LifecycleState::Starting)
        {
            tracing::debug!(
                "{} {} already starting or running",
                self.role,
                self.config.member_name
            );
            return Ok(());
        }

        tracing::info!("Starting {} {}", self.role, self.config.member_name);
        self.launch(shutdown).await?;
        tracing::info!("{} {} is running", self.role, self.config.member_name);
        Ok(())
    }

    async fn stop(&self) -> Result<(), GridError> {
        if !self
            .state
            .transition(LifecycleState::Running, LifecycleState::Stopped)
        {
            return Ok(());
        }

        tracing::info!("Stopping {} {}", self.role, self.config.member_name);
        self.registry.release(&self.state);

        if let Err(e) = self.engine.stop_member().await {
            tracing::warn!(
                "{} {} did not stop cleanly: {}",
                self.role,
                self.config.member_name,
                e
            );
            return Err(e);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.get() == LifecycleState::Running
    }
}
