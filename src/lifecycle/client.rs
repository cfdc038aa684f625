use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

use super::types::{LifecycleState, StateCell};
use super::{Lifecycle, PHASE_CLIENT};
use crate::config::BrowserSettings;
use crate::engine::client::ClientCache;
use crate::engine::registry::CacheHandleRegistry;
use crate::error::GridError;

/// Opens the client cache of a browser process and closes it at shutdown.
pub struct ClientConnection {
    settings: BrowserSettings,
    registry: Arc<CacheHandleRegistry>,
    state: Arc<StateCell>,
}

impl ClientConnection {
    pub fn new(settings: BrowserSettings, registry: Arc<CacheHandleRegistry>) -> Self {
        Self {
            settings,
            registry,
            state: Arc::new(StateCell::default()),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }
}

#[async_trait]
impl Lifecycle for ClientConnection {
    fn name(&self) -> &str {
        &self.settings.member_name
    }

    fn phase(&self) -> i32 {
        PHASE_CLIENT
    }

    async fn start(&self, _shutdown: watch::Receiver<bool>) -> Result<(), GridError> {
        if !self
            .state
            .transition(LifecycleState::Stopped, LifecycleState::Starting)
        {
            return Ok(());
        }

        let cache = ClientCache::connect(&self.settings).await;
        self.registry.publish(cache, self.state.clone());
        self.state.set(LifecycleState::Running);
        Ok(())
    }

    async fn stop(&self) -> Result<(), GridError> {
        if !self
            .state
            .transition(LifecycleState::Running, LifecycleState::Stopped)
        {
            return Ok(());
        }

        self.registry.release(&self.state);
        tracing::info!("Client connection {} closed", self.settings.member_name);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.get() == LifecycleState::Running
    }
}
