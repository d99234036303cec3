//! Per-pass diagnostics.

use kiroku_types::ChangeId;

/// Recoverable conditions met during a build pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildWarning {
    /// Two snapshot chains had no common snapshot; `kept` won by id order.
    VersionsSplit { kept: ChangeId, dropped: ChangeId },
    /// A log was excluded because one of its records failed to decode.
    DroppedLog { head: ChangeId, reason: String },
    /// Loaded changes that could not be attached under the breakpoint.
    Unattached { ids: Vec<ChangeId> },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub breakpoint: Option<ChangeId>,
    /// Heads dropped because a snapshot's `log_heads` already covers them.
    pub subsumed_heads: Vec<ChangeId>,
    pub warnings: Vec<BuildWarning>,
    /// Store round-trips made by the pass.
    pub fetches: usize,
}

impl BuildReport {
    pub fn warn(&mut self, warning: BuildWarning) {
        self.warnings.push(warning);
    }

    pub fn dropped_heads(&self) -> Vec<&ChangeId> {
        self.warnings
            .iter()
            .filter_map(|w| match w {
                BuildWarning::DroppedLog { head, .. } => Some(head),
                _ => None,
            })
            .collect()
    }

    pub fn has_split(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, BuildWarning::VersionsSplit { .. }))
    }
}
