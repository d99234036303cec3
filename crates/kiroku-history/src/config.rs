//! History pass configuration.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryConfig {
    /// When two snapshot chains share no snapshot, keep the lexicographically
    /// smaller one and warn instead of failing with `VersionsSplit`.
    pub lenient_versions_split: bool,
    /// Upper bound on `last_snapshot_id` steps per chain while resolving.
    pub max_snapshot_chain: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            lenient_versions_split: true,
            max_snapshot_chain: 10_000,
        }
    }
}

impl HistoryConfig {
    pub fn strict() -> Self {
        Self {
            lenient_versions_split: false,
            ..Self::default()
        }
    }
}
