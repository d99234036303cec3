//! Kernel error type.

use thiserror::Error;

use kiroku_history::HistoryError;
use kiroku_state::StateError;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("config parse error: {0}")]
    Config(#[from] ron::error::SpannedError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An authored change encodes larger than `snapshot.max_change_size`.
    #[error("change too big: {size} bytes (limit {limit})")]
    ChangeTooBig { size: usize, limit: usize },

    /// The document has no tree yet; build or open it first.
    #[error("document has no history")]
    NoHistory,
}

impl KernelError {
    /// True for errors that mean "nothing stored yet" rather than failure.
    pub fn is_empty_history(&self) -> bool {
        matches!(self, KernelError::History(HistoryError::EmptyHistory) | KernelError::NoHistory)
    }
}
