use std::sync::Arc;
use tokio::sync::watch;

use super::Lifecycle;
use crate::error::GridError;

/// Ordered set of lifecycles owned by the hosting process.
#[derive(Default)]
pub struct LifecycleSupervisor {
    lifecycles: Vec<Arc<dyn Lifecycle>>,
}

impl LifecycleSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, lifecycle: Arc<dyn Lifecycle>) -> &mut Self {
        self.lifecycles.push(lifecycle);
        self
    }

    /// Registration order breaks ties between equal phases.
    fn ascending(&self) -> Vec<Arc<dyn Lifecycle>> {
        let mut ordered = self.lifecycles.clone();
        ordered.sort_by_key(|lifecycle| lifecycle.phase());
        ordered
    }

    /// Starts everything in ascending phase order. On the first failure the
    /// lifecycles already started are stopped again, newest first, and the
    /// failure is returned.
    pub async fn start_all(&self, shutdown: &watch::Receiver<bool>) -> Result<(), GridError> {
        let mut started: Vec<Arc<dyn Lifecycle>> = Vec::new();

        for lifecycle in self.ascending() {
            tracing::debug!(
                "Starting lifecycle {} (phase {})",
                lifecycle.name(),
                lifecycle.phase()
            );

            if let Err(e) = lifecycle.start(shutdown.clone()).await {
                tracing::error!("Lifecycle {} failed to start: {}", lifecycle.name(), e);

                for previous in started.iter().rev() {
                    if let Err(stop_err) = previous.stop().await {
                        tracing::warn!(
                            "Rollback of {} failed: {}",
                            previous.name(),
                            stop_err
                        );
                    }
                }
                return Err(e);
            }
            started.push(lifecycle);
        }

        Ok(())
    }

    /// Stops everything in descending phase order. Every lifecycle gets a stop
    /// call; failures are collected rather than returned early.
    pub async fn stop_all(&self) -> Vec<(String, GridError)> {
        let mut failures = Vec::new();

        for lifecycle in self.ascending().into_iter().rev() {
            if let Err(e) = lifecycle.stop().await {
                tracing::warn!("Lifecycle {} failed to stop: {}", lifecycle.name(), e);
                failures.push((lifecycle.name().to_string(), e));
            }
        }

        failures
    }
}
