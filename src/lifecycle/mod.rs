//! Member Lifecycle Orchestration
//!
//! Starts and stops the embedded grid members in step with the hosting
//! process.
//!
//! ## Components
//! - **`ClusterMemberLifecycle`**: `Stopped -> Starting -> Running` state
//!   machine for one locator or server member. A server waits, with a bounded
//!   retry budget, until the engine publishes its cache.
//! - **`ClientConnection`**: opens the client cache of a browser process.
//! - **`LifecycleSupervisor`**: starts registered lifecycles in ascending
//!   phase order and stops them in descending order.
//! - **`ReadinessPoller`** / **`WorkingDirectoryResolver`**: the retry and
//!   directory primitives the member lifecycle is built from.
//!
//! Startup errors are fatal: the supervisor rolls back what it started and
//! hands the error to the binary, which exits.

pub mod client;
pub mod member;
pub mod poller;
pub mod supervisor;
pub mod types;
pub mod workdir;


use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::GridError;

/// Members start before anything that needs them.
pub const PHASE_MEMBER: i32 = i32::MIN;
pub const PHASE_CLIENT: i32 = 0;

#[async_trait]
pub trait Lifecycle: Send + Sync {
    fn name(&self) -> &str;

    /// Lower phases start first and stop last.
    fn phase(&self) -> i32;

    /// Idempotent: a call on a starting or running instance returns `Ok`.
    async fn start(&self, shutdown: watch::Receiver<bool>) -> Result<(), GridError>;

    /// Idempotent: a call on a stopped instance returns `Ok`.
    async fn stop(&self) -> Result<(), GridError>;

    fn is_running(&self) -> bool;
}
