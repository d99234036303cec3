//! Kernel configuration, loaded from `kiroku.ron`.
//!
//! ```ron
//! (
//!     history: (lenient_versions_split: false),
//!     snapshot: (min_changes: 200),
//!     hydrate: (concurrency: 4, timeout_ms: 5000),
//! )
//! ```
//!
//! Every section and field is optional; unknown fields are rejected.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use kiroku_history::HistoryConfig;

use crate::Result;

pub const CONFIG_FILE_NAME: &str = "kiroku.ron";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    pub history: HistoryConfig,
    pub snapshot: SnapshotConfig,
    pub normalize: NormalizeConfig,
    pub hydrate: HydrateConfig,
}

/// When authored changes carry a full snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    /// No random snapshots until this many changes follow the last one.
    pub min_changes: usize,
    /// Every `spread` changes past the minimum widen the snapshot window.
    pub spread: usize,
    /// Encoded records above this size are refused.
    pub max_change_size: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            min_changes: 100,
            spread: 50,
            max_change_size: 16 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizeConfig {
    /// Rebalance divs and hoist the header on the final apply of a replay.
    pub with_layouts: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self { with_layouts: true }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HydrateConfig {
    /// Bookmark fetches in flight at once.
    pub concurrency: usize,
    /// Deadline for the whole hydration, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for HydrateConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout_ms: 10_000,
        }
    }
}

impl KernelConfig {
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron(&text)
    }

    /// Loads `path` when it exists, otherwise the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// `$XDG_CONFIG_HOME/kiroku/kiroku.ron` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kiroku").join(CONFIG_FILE_NAME))
    }
}
