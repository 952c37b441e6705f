//! Engine tuning knobs

use serde::{Deserialize, Serialize};

use crate::domain_set::DEFAULT_DENSE_CUTOFF;

/// Token buckets at or above this size are partitioned by request type.
pub const DEFAULT_OPTIMIZE_THRESHOLD: usize = 8;

/// Engine configuration. Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum bucket size for type partitioning in `optimize()`
    pub optimize_threshold: usize,
    /// `stride * count` at which a frozen domain-set bucket goes dense
    pub dense_cutoff: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            optimize_threshold: DEFAULT_OPTIMIZE_THRESHOLD,
            dense_cutoff: DEFAULT_DENSE_CUTOFF,
        }
    }
}
