//! REST Surface
//!
//! Two routers over the same handlers:
//!
//! - **`server_router`**: a server member. Hosts regions, serves the
//!   management API and the internal protocol used by client proxies.
//! - **`browser_router`**: a client process. Region creates and deletes go to
//!   the server's management API; data calls run through local proxies.
//!
//! Failures are returned as `{success:false, error}` with `400` or `404`.

pub mod handlers;
pub mod internal;


use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use std::sync::Arc;

use crate::engine::registry::CacheHandleRegistry;
use crate::region::data::DataService;
use crate::region::protocol::ENDPOINT_MANAGEMENT_REGIONS;
use crate::region::service::RegionCatalog;
use handlers::*;
use internal::*;

fn public_routes() -> Router {
    Router::new()
        .route("/api/regions", get(handle_list_regions))
        .route(
            "/api/regions/:name",
            get(handle_region_info)
                .post(handle_create_region)
                .delete(handle_delete_region),
        )
        .route("/api/data/:region", get(handle_list_data))
        .route(
            "/api/data/:region/:key",
            get(handle_get_data)
                .put(handle_put_data)
                .post(handle_put_data)
                .delete(handle_delete_data),
        )
        .route("/api/cluster/status", get(handle_cluster_status))
}

pub fn server_router(
    registry: Arc<CacheHandleRegistry>,
    catalog: Arc<dyn RegionCatalog>,
    data: Arc<DataService>,
) -> Router {
    public_routes()
        .route(
            &format!("{}/:name", ENDPOINT_MANAGEMENT_REGIONS),
            post(handle_create_region).delete(handle_delete_region),
        )
        .route("/internal/regions/:region", get(handle_region_summary))
        .route("/internal/regions/:region/entries", get(handle_entries))
        .route(
            "/internal/regions/:region/entries/:key",
            get(handle_get_entry)
                .put(handle_put_entry)
                .delete(handle_delete_entry),
        )
        .layer(Extension(catalog))
        .layer(Extension(data))
        .layer(Extension(registry))
}

pub fn browser_router(
    registry: Arc<CacheHandleRegistry>,
    catalog: Arc<dyn RegionCatalog>,
    data: Arc<DataService>,
) -> Router {
    public_routes()
        .layer(Extension(catalog))
        .layer(Extension(data))
        .layer(Extension(registry))
}
