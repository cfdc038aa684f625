use axum::{
    Json,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::engine::registry::CacheHandleRegistry;
use crate::error::GridError;
use crate::region::data::DataService;
use crate::region::protocol::{
    ClusterStatus, CreateRegionQuery, DataPageQuery, ErrorResponse, PutDataRequest,
    RegionListQuery, RegionListing, RegionOperationResponse,
};
use crate::region::service::RegionCatalog;

pub type Catalog = Arc<dyn RegionCatalog>;

pub fn error_status(err: &GridError) -> StatusCode {
    match err {
        GridError::RegionNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    }
}

pub fn error_response(err: GridError) -> Response {
    let status = error_status(&err);
    (status, Json(ErrorResponse::new(err.to_string()))).into_response()
}

/// Malformed bodies and query strings get the same `{success:false, error}`
/// shape as every other failure.
pub fn rejection_response(rejection: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(format!("Invalid request: {}", rejection))),
    )
        .into_response()
}

pub async fn handle_list_regions(
    Extension(catalog): Extension<Catalog>,
    query: Result<Query<RegionListQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return rejection_response(rejection),
    };

    let listing = if query.info.unwrap_or(false) {
        RegionListing::Info(catalog.list_info().await)
    } else {
        RegionListing::Names(catalog.list_names().await)
    };
    (StatusCode::OK, Json(listing)).into_response()
}

pub async fn handle_region_info(
    Extension(catalog): Extension<Catalog>,
    Path(name): Path<String>,
) -> Response {
    match catalog.region_info(&name).await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_create_region(
    Extension(catalog): Extension<Catalog>,
    Path(name): Path<String>,
    Query(query): Query<CreateRegionQuery>,
) -> (StatusCode, Json<RegionOperationResponse>) {
    let response = catalog
        .create_region(&name, query.region_type.as_deref())
        .await;
    let status = if response.success {
        StatusCode::CREATED
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(response))
}

pub async fn handle_delete_region(
    Extension(catalog): Extension<Catalog>,
    Path(name): Path<String>,
) -> (StatusCode, Json<RegionOperationResponse>) {
    let response = catalog.delete_region(&name).await;
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(response))
}

pub async fn handle_list_data(
    Extension(data): Extension<Arc<DataService>>,
    Path(region): Path<String>,
    query: Result<Query<DataPageQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return rejection_response(rejection),
    };

    match data.list(&region, query.limit, query.offset).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_get_data(
    Extension(data): Extension<Arc<DataService>>,
    Path((region, key)): Path<(String, String)>,
) -> Response {
    match data.get(&region, &key).await {
        Ok(found) if found.exists => (StatusCode::OK, Json(found)).into_response(),
        Ok(missing) => (StatusCode::NOT_FOUND, Json(missing)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_put_data(
    Extension(data): Extension<Arc<DataService>>,
    Path((region, key)): Path<(String, String)>,
    body: Result<Json<PutDataRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };

    match data.put(&region, &key, req.value).await {
        Ok(stored) => (StatusCode::OK, Json(stored)).into_response(),
        Err(e) => {
            tracing::error!("Failed to put {} into {}: {}", key, region, e);
            error_response(e)
        }
    }
}

pub async fn handle_delete_data(
    Extension(data): Extension<Arc<DataService>>,
    Path((region, key)): Path<(String, String)>,
) -> Response {
    match data.delete(&region, &key).await {
        Ok(removed) => (StatusCode::OK, Json(removed)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_cluster_status(
    Extension(registry): Extension<Arc<CacheHandleRegistry>>,
) -> Json<ClusterStatus> {
    let status = match registry.get_active() {
        Some(handle) => {
            let members = handle.members();
            ClusterStatus {
                status: "connected".to_string(),
                cache_name: Some(handle.name()),
                member_count: members.len(),
                members,
            }
        }
        None => ClusterStatus {
            status: "disconnected".to_string(),
            cache_name: None,
            member_count: 0,
            members: Vec::new(),
        },
    };
    Json(status)
}
