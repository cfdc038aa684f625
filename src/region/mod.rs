//! Region Management
//!
//! Everything the REST layer does with regions, independent of HTTP:
//!
//! - **`resolver`**: type token to `RegionCategory`, defaulting to `PARTITION`.
//! - **`service`**: create/delete/list/describe, for the server member
//!   (`ServerRegionService`) and for the browser (`ClientRegionService`).
//! - **`reconciler`**: keeps the browser's proxy bindings in line with the
//!   regions that exist on the server.
//! - **`management`**: HTTP client for the server's management API.
//! - **`data`**: key/value reads and writes.
//! - **`protocol`**: JSON bodies of the public endpoints.

pub mod data;
pub mod management;
pub mod protocol;
pub mod reconciler;
pub mod resolver;
pub mod service;

#[cfg(test)]
mod tests;
