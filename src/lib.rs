//! Region Grid Library
//!
//! An in-memory data grid exposed over REST. A process runs as one of three
//! roles: a locator, a server member hosting regions, or a browser holding a
//! client cache whose regions proxy onto the servers.
//!
//! ## Architecture Modules
//!
//! - **`lifecycle`**: start/stop state machines for embedded members and the
//!   client connection, the readiness poller and the phase-ordered supervisor.
//! - **`engine`**: the cache engine boundary (`CacheEngine`, `CacheHandle`,
//!   `Region`), the UDP gossip membership used by embedded members, and the
//!   handle registry shared with request handlers.
//! - **`region`**: region type resolution, proxy reconciliation on the client
//!   side, and the region/data services behind the REST handlers.
//! - **`api`**: the axum routers for server and browser processes.
//! - **`config`**: layered settings for all three roles.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod region;
