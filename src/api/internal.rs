//! Server side of the proxy-region protocol used by client caches.

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

use super::handlers::{error_response, rejection_response};
use crate::engine::Region;
use crate::engine::protocol::{
    EntriesPage, EntriesQuery, EntryValue, PreviousValue, PutEntryRequest, RegionSummary,
};
use crate::engine::registry::CacheHandleRegistry;
use crate::error::GridError;
use crate::region::protocol::DEFAULT_PAGE_LIMIT;

fn hosted_region(
    registry: &CacheHandleRegistry,
    name: &str,
) -> Result<Arc<dyn Region>, GridError> {
    registry
        .require_active()?
        .region(name)?
        .ok_or_else(|| GridError::RegionNotFound(name.to_string()))
}

pub async fn handle_region_summary(
    Extension(registry): Extension<Arc<CacheHandleRegistry>>,
    Path(name): Path<String>,
) -> Response {
    let result = async {
        let region = hosted_region(&registry, &name)?;
        let keys = region.keys().await?;
        Ok::<_, GridError>(RegionSummary {
            name: region.name().to_string(),
            region_type: region.category(),
            size: keys.len(),
            keys,
        })
    }
    .await;

    match result {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_entries(
    Extension(registry): Extension<Arc<CacheHandleRegistry>>,
    Path(name): Path<String>,
    query: Result<Query<EntriesQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return rejection_response(rejection),
    };

    let result = async {
        let region = hosted_region(&registry, &name)?;
        region
            .entries(
                query.offset.unwrap_or(0),
                query.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            )
            .await
    }
    .await;

    match result {
        Ok(entries) => (StatusCode::OK, Json(EntriesPage { entries })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_get_entry(
    Extension(registry): Extension<Arc<CacheHandleRegistry>>,
    Path((name, key)): Path<(String, String)>,
) -> Response {
    let result = async { hosted_region(&registry, &name)?.get(&key).await }.await;

    match result {
        Ok(value) => (StatusCode::OK, Json(EntryValue { value })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_put_entry(
    Extension(registry): Extension<Arc<CacheHandleRegistry>>,
    Path((name, key)): Path<(String, String)>,
    body: Result<Json<PutEntryRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };

    let result = async { hosted_region(&registry, &name)?.put(&key, req.value).await }.await;

    match result {
        Ok(previous) => (StatusCode::OK, Json(PreviousValue { previous })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_delete_entry(
    Extension(registry): Extension<Arc<CacheHandleRegistry>>,
    Path((name, key)): Path<(String, String)>,
) -> Response {
    let result = async { hosted_region(&registry, &name)?.remove(&key).await }.await;

    match result {
        Ok(previous) => (StatusCode::OK, Json(PreviousValue { previous })).into_response(),
        Err(e) => error_response(e),
    }
}
