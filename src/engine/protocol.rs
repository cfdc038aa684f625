use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::RegionEntry;
use crate::region::resolver::RegionCategory;

/// Path segments of the proxy-region protocol served by server members:
///
/// - `GET    /internal/regions/:region`                 -> `RegionSummary`
/// - `GET    /internal/regions/:region/entries`         -> `EntriesPage`
/// - `GET    /internal/regions/:region/entries/:key`    -> `EntryValue`
/// - `PUT    /internal/regions/:region/entries/:key`    -> `PreviousValue`
/// - `DELETE /internal/regions/:region/entries/:key`    -> `PreviousValue`
///
/// A region the server does not host answers `404`.
pub const INTERNAL_SEGMENT: &str = "internal";
pub const REGIONS_SEGMENT: &str = "regions";
pub const ENTRIES_SEGMENT: &str = "entries";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSummary {
    pub name: String,
    pub region_type: RegionCategory,
    pub size: usize,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryValue {
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutEntryRequest {
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousValue {
    pub previous: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntriesPage {
    pub entries: Vec<RegionEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntriesQuery {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}
