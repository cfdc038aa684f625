//! Error taxonomy shared by the lifecycle, engine and region layers.
//!
//! Startup-phase errors (`Configuration`, `StartupTimeout`, `Cancelled`) abort
//! the hosting process's bootstrap. Every other variant is recovered at the
//! request boundary into a `{success:false, error}` JSON body.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridError {
    /// Working directory could not be resolved or created, or settings are invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The readiness budget ran out before the engine published a cache.
    #[error("cache did not become available after {attempts} attempts ({waited:?})")]
    StartupTimeout { attempts: u32, waited: Duration },

    /// A shutdown signal arrived while waiting.
    #[error("cancelled while waiting for {what}")]
    Cancelled { what: String },

    /// Management API unreachable or answered with a non-2xx status.
    #[error("{0}")]
    RemoteCall(String),

    #[error("Region not found: {0}")]
    RegionNotFound(String),

    #[error("Region already exists: {0}")]
    RegionExists(String),

    #[error("Cache is not available")]
    CacheUnavailable,

    /// The engine-side handle was closed underneath the caller.
    #[error("cache is closed")]
    CacheClosed,

    #[error("engine error: {0}")]
    Engine(String),
}

impl GridError {
    /// Errors that must abort application bootstrap.
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            GridError::Configuration(_)
                | GridError::StartupTimeout { .. }
                | GridError::Cancelled { .. }
        )
    }

    /// Closed and missing handles are the same thing to callers.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GridError::CacheUnavailable | GridError::CacheClosed)
    }
}
