use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::GridError;

/// Which kind of cluster member a lifecycle drives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MemberRole {
    /// Membership and discovery only. Hosts no region data.
    Locator,
    /// Hosts region data and serves client requests.
    Server,
    /// Client cache. Never launched by `ClusterMemberLifecycle`.
    Client,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Locator => "locator",
            MemberRole::Server => "server",
            MemberRole::Client => "client",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locator endpoint in the grid's `host[port]` notation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocatorAddress {
    pub host: String,
    pub port: u16,
}

impl LocatorAddress {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    /// Resolves to a socket address, preferring the first result.
    pub async fn resolve(&self) -> Result<SocketAddr, GridError> {
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| GridError::Configuration(format!("cannot resolve locator {}: {}", self, e)))?
            .next()
            .ok_or_else(|| GridError::Configuration(format!("locator {} has no address", self)))
    }
}

impl fmt::Display for LocatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.host, self.port)
    }
}

impl FromStr for LocatorAddress {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GridError::Configuration(format!("invalid locator address: {}", s));
        let trimmed = s.trim();
        let open = trimmed.find('[').ok_or_else(invalid)?;
        if !trimmed.ends_with(']') || open == 0 {
            return Err(invalid());
        }
        let host = &trimmed[..open];
        let port = trimmed[open + 1..trimmed.len() - 1]
            .parse::<u16>()
            .map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }
}

/// Launch description handed to the engine. Built fresh on every start.
#[derive(Debug, Clone)]
pub struct MemberSpec {
    pub role: MemberRole,
    pub member_name: String,
    pub bind_host: String,
    /// 0 lets the engine choose.
    pub port: u16,
    pub working_dir: PathBuf,
    /// Server role only: where to register.
    pub locator: Option<LocatorAddress>,
    /// Server role only: HTTP address clients use for proxy-region traffic.
    pub advertise_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LifecycleState::Starting,
            2 => LifecycleState::Running,
            _ => LifecycleState::Stopped,
        }
    }
}

/// Atomic holder for a `LifecycleState`. Shared with the registry so handle
/// lookups can check the owner's state.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: LifecycleState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: LifecycleState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Moves `from -> to` only if the current state is `from`.
    pub fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(LifecycleState::Stopped)
    }
}
