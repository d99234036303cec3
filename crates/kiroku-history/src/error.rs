//! Error types for history passes.

use thiserror::Error;

use kiroku_types::ChangeId;

/// Errors that can occur while loading, resolving, or linking changes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// No logs, or no snapshot lineage in reach of any head.
    ///
    /// Callers treat this as a brand-new document.
    #[error("empty history")]
    EmptyHistory,

    /// The record store has no record for this id.
    #[error("record not found: {0}")]
    RecordNotFound(ChangeId),

    /// The codec rejected the record bytes.
    #[error("decode failed for {id}: {reason}")]
    DecodeFailed { id: ChangeId, reason: String },

    /// Two snapshot chains end without a common snapshot.
    #[error("versions split: {a} and {b} share no snapshot")]
    VersionsSplit { a: ChangeId, b: ChangeId },

    /// The pass was canceled by the caller.
    #[error("pass canceled")]
    Canceled,

    /// A `last_snapshot_id` chain is longer than the configured bound.
    #[error("snapshot chain from {0} exceeds the walk bound")]
    SnapshotChainTooLong(ChangeId),

    /// Encoding a change record failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Backend failure inside a record store.
    #[error("record store error: {0}")]
    Store(String),
}

impl HistoryError {
    pub fn decode(id: &ChangeId, reason: impl ToString) -> Self {
        HistoryError::DecodeFailed {
            id: id.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn is_decode_failed(&self) -> bool {
        matches!(self, HistoryError::DecodeFailed { .. })
    }
}
