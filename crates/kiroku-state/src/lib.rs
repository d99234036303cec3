//! Document state for kiroku.
//!
//! Replaying a change means forking a [`DocumentState`], applying the
//! change's operations to the fork, and folding the fork back:
//!
//! ```text
//!   state ──new_state()──► fork ──apply_changes(ops)──► fork' ──apply(mode)──► state'
//!                           │                                        │
//!                           └─ reads fall through to `state`         └─ normalize, diff,
//!                                                                       events, undo
//! ```
//!
//! Each op runs in its own nested fork, so a failing op (missing block,
//! wrong block kind, move into its own subtree) is dropped whole and replay
//! carries on.
//!
//! | Module        | Purpose                                          |
//! |---------------|--------------------------------------------------|
//! | [`state`]     | Copy-on-write state chain, details, relations    |
//! | [`ops`]       | Change content dispatcher, cycle check           |
//! | [`insert`]    | Positions, side columns, replace                 |
//! | [`update`]    | Typed per-kind block updates                     |
//! | [`normalize`] | Tree invariants, div rebalancing, header         |
//! | [`apply`]     | Fold into parent, events, undo                   |
//! | [`layout`]    | Div wrapper cleanup                              |

pub mod apply;
pub mod error;
pub mod events;
pub mod insert;
pub mod layout;
pub mod normalize;
pub mod ops;
pub mod render;
pub mod snapshot;
pub mod state;
pub mod undo;
pub mod update;

pub use apply::ApplyMode;
pub use error::StateError;
pub use events::{ApplyResult, Event};
pub use layout::cleanup_layouts;
pub use normalize::{DETAIL_VALUE_LIMIT, MAX_CHILDREN};
pub use state::DocumentState;
pub use undo::{Action, BlockChange, UNDO_LIMIT, UndoHistory};
pub use update::{ApplyEvent, apply_update};

pub type Result<T> = std::result::Result<T, StateError>;
