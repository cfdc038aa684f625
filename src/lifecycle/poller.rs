//! Bounded readiness polling.
//!
//! Calls a readiness check a fixed number of times with a fixed pause between
//! failed attempts. A check error counts as a failed attempt. A shutdown signal
//! seen before or during a pause ends the wait with `GridError::Cancelled`.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::config::ReadinessSettings;
use crate::error::GridError;

#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    max_attempts: u32,
    interval: Duration,
    what: String,
}

impl ReadinessPoller {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
            what: "cache".to_string(),
        }
    }

    pub fn from_settings(settings: &ReadinessSettings) -> Self {
        Self::new(settings.max_attempts, settings.interval())
    }

    /// Names the awaited resource in logs and errors.
    pub fn describing(mut self, what: impl Into<String>) -> Self {
        self.what = what.into();
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn poll<T, F, Fut>(
        &self,
        mut check: F,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<T, GridError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, GridError>>,
    {
        let started = Instant::now();

        for attempt in 1..=self.max_attempts {
            match check().await {
                Ok(Some(value)) => {
                    tracing::debug!("{} ready after {} attempt(s)", self.what, attempt);
                    return Ok(value);
                }
                Ok(None) => {
                    tracing::debug!(
                        "{} not ready (attempt {}/{})",
                        self.what,
                        attempt,
                        self.max_attempts
                    );
                }
                Err(e) => {
                    tracing::debug!(
                        "{} readiness check failed (attempt {}/{}): {}",
                        self.what,
                        attempt,
                        self.max_attempts,
                        e
                    );
                }
            }

            if attempt == self.max_attempts {
                break;
            }

            if *shutdown.borrow_and_update() {
                return Err(self.cancelled());
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown_requested(shutdown) => {
                    return Err(self.cancelled());
                }
            }
        }

        tracing::error!(
            "{} unavailable after {} attempts",
            self.what,
            self.max_attempts
        );
        Err(GridError::StartupTimeout {
            attempts: self.max_attempts,
            waited: started.elapsed(),
        })
    }

    fn cancelled(&self) -> GridError {
        tracing::warn!("Shutdown requested while waiting for {}", self.what);
        GridError::Cancelled {
            what: self.what.clone(),
        }
    }
}

/// Resolves once the flag flips to true. A dropped sender never resolves.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
