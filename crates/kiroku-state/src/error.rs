//! Error types for state operations.

use thiserror::Error;

use kiroku_types::{BlockKind, Position};

/// Errors raised while applying operations to a [`DocumentState`](crate::DocumentState).
///
/// Most of these are recovered locally: the replayer logs them, reverts the
/// offending op, and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("block {0} has no parent")]
    NoParent(String),

    /// A typed update addressed a block of another kind.
    #[error("block {id} is {actual}, not {expected}")]
    NotThatKind {
        id: String,
        expected: BlockKind,
        actual: BlockKind,
    },

    #[error("cycle detected at block {0}")]
    CycleDetected(String),

    #[error("cannot move {id} to {target}")]
    InvalidMove { id: String, target: String },

    #[error("unexpected position: {0}")]
    UnexpectedPosition(Position),

    #[error("block already exists: {0}")]
    DuplicateBlock(String),

    #[error("view {view} not found in dataview {block}")]
    ViewNotFound { block: String, view: String },

    #[error("block {parent} lists missing child {child}")]
    MissingChild { parent: String, child: String },

    #[error("block {child} is a child of both {first} and {second}")]
    DuplicateChild {
        child: String,
        first: String,
        second: String,
    },

    /// The normalizer could not restore the tree invariants.
    #[error("normalization failed: {0}")]
    NormalizationFailed(String),
}
