use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::types::{MemberInfo, RegionEntry};
use crate::region::resolver::RegionCategory;

pub const ENDPOINT_MANAGEMENT_REGIONS: &str = "/management/regions";
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Body of every region create/delete answer, on both the management API and
/// the client-facing API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionOperationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub region_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub region_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub proxy_warning: Option<String>,
}

impl RegionOperationResponse {
    pub fn created(name: &str, category: RegionCategory) -> Self {
        Self {
            success: true,
            message: Some(format!("Region created successfully: {}", name)),
            region_name: Some(name.to_string()),
            region_type: Some(category.to_string()),
            ..Self::default()
        }
    }

    pub fn deleted(name: &str) -> Self {
        Self {
            success: true,
            message: Some(format!("Region deleted successfully: {}", name)),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionInfo {
    pub name: String,
    pub full_path: String,
    pub region_type: RegionCategory,
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size_error: Option<String>,
    /// Set by client processes: whether a local proxy is bound.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_proxied: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RegionListing {
    Names(Vec<String>),
    Info(Vec<RegionInfo>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegionListQuery {
    pub info: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRegionQuery {
    #[serde(rename = "type")]
    pub region_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataPageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionDataResponse {
    pub success: bool,
    pub region: String,
    pub keys: Vec<String>,
    pub size: usize,
    pub entries: Vec<RegionEntry>,
    pub returned_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDataResponse {
    pub success: bool,
    pub region: String,
    pub key: String,
    pub value: Value,
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutDataRequest {
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutDataResponse {
    pub success: bool,
    pub message: String,
    pub region: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDataResponse {
    pub success: bool,
    pub message: String,
    pub region: String,
    pub key: String,
    pub removed_value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cache_name: Option<String>,
    pub member_count: usize,
    pub members: Vec<MemberInfo>,
}
