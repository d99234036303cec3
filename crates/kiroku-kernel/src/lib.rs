//! # kiroku-kernel
//!
//! Ties history and state together into live documents.
//!
//! A kernel document:
//! - Builds its change tree from a [`RecordStore`](kiroku_history::RecordStore)
//! - Replays the tree into a normalized [`DocumentState`](kiroku_state::DocumentState)
//! - Follows head updates, appending or rebuilding as the tree moves
//! - Authors new changes, attaching snapshots now and then
//!
//! | Module       | Purpose                                        |
//! |--------------|------------------------------------------------|
//! | [`replay`]   | Tree to state, full or incremental             |
//! | [`document`] | Live document following store heads            |
//! | [`writer`]   | Change authoring and snapshot policy           |
//! | [`db`]       | SQLite record store                            |
//! | [`hydrate`]  | Bookmark metadata fetching                     |
//! | [`config`]   | `kiroku.ron` configuration                     |

pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod hydrate;
pub mod replay;
pub mod writer;

pub use config::{CONFIG_FILE_NAME, HydrateConfig, KernelConfig, NormalizeConfig, SnapshotConfig};
pub use db::SqliteRecordStore;
pub use document::HistoryDocument;
pub use error::KernelError;
pub use hydrate::{BookmarkFetcher, HydrateReport, hydrate_bookmarks};
pub use replay::StateReplayer;
pub use writer::{ChangeWriter, PushOptions, governing_snapshot, snapshot_chance};

pub type Result<T> = std::result::Result<T, KernelError>;
