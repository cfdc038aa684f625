use serde::{Deserialize, Serialize};
use std::fmt;

/// Region topologies a server member can host, plus the client-side proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegionCategory {
    Partition,
    PartitionRedundant,
    PartitionPersistent,
    PartitionRedundantPersistent,
    PartitionOverflow,
    PartitionRedundantOverflow,
    PartitionPersistentOverflow,
    PartitionHeapLru,
    Replicate,
    ReplicatePersistent,
    ReplicateOverflow,
    ReplicatePersistentOverflow,
    ReplicateHeapLru,
    Local,
    LocalPersistent,
    LocalOverflow,
    LocalHeapLru,
    /// Client binding without local storage. Never chosen from a type token.
    Proxy,
}

impl RegionCategory {
    pub const DEFAULT: RegionCategory = RegionCategory::Partition;

    /// Categories a caller may request by name.
    pub const SUPPORTED: [RegionCategory; 17] = [
        RegionCategory::Partition,
        RegionCategory::PartitionRedundant,
        RegionCategory::PartitionPersistent,
        RegionCategory::PartitionRedundantPersistent,
        RegionCategory::PartitionOverflow,
        RegionCategory::PartitionRedundantOverflow,
        RegionCategory::PartitionPersistentOverflow,
        RegionCategory::PartitionHeapLru,
        RegionCategory::Replicate,
        RegionCategory::ReplicatePersistent,
        RegionCategory::ReplicateOverflow,
        RegionCategory::ReplicatePersistentOverflow,
        RegionCategory::ReplicateHeapLru,
        RegionCategory::Local,
        RegionCategory::LocalPersistent,
        RegionCategory::LocalOverflow,
        RegionCategory::LocalHeapLru,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegionCategory::Partition => "PARTITION",
            RegionCategory::PartitionRedundant => "PARTITION_REDUNDANT",
            RegionCategory::PartitionPersistent => "PARTITION_PERSISTENT",
            RegionCategory::PartitionRedundantPersistent => "PARTITION_REDUNDANT_PERSISTENT",
            RegionCategory::PartitionOverflow => "PARTITION_OVERFLOW",
            RegionCategory::PartitionRedundantOverflow => "PARTITION_REDUNDANT_OVERFLOW",
            RegionCategory::PartitionPersistentOverflow => "PARTITION_PERSISTENT_OVERFLOW",
            RegionCategory::PartitionHeapLru => "PARTITION_HEAP_LRU",
            RegionCategory::Replicate => "REPLICATE",
            RegionCategory::ReplicatePersistent => "REPLICATE_PERSISTENT",
            RegionCategory::ReplicateOverflow => "REPLICATE_OVERFLOW",
            RegionCategory::ReplicatePersistentOverflow => "REPLICATE_PERSISTENT_OVERFLOW",
            RegionCategory::ReplicateHeapLru => "REPLICATE_HEAP_LRU",
            RegionCategory::Local => "LOCAL",
            RegionCategory::LocalPersistent => "LOCAL_PERSISTENT",
            RegionCategory::LocalOverflow => "LOCAL_OVERFLOW",
            RegionCategory::LocalHeapLru => "LOCAL_HEAP_LRU",
            RegionCategory::Proxy => "PROXY",
        }
    }
}

impl fmt::Display for RegionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a user-supplied type token to a region category.
///
/// Matching is case-insensitive. Missing, blank and unknown tokens all fall
/// back to `PARTITION`; unknown ones are logged so typos are at least visible.
pub struct RegionTypeResolver;

impl RegionTypeResolver {
    pub fn resolve(token: Option<&str>) -> RegionCategory {
        let Some(raw) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return RegionCategory::DEFAULT;
        };

        match RegionCategory::SUPPORTED
            .iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(raw))
        {
            Some(category) => *category,
            None => {
                tracing::warn!(
                    "Unknown region type '{}', using {}",
                    raw,
                    RegionCategory::DEFAULT
                );
                RegionCategory::DEFAULT
            }
        }
    }
}
