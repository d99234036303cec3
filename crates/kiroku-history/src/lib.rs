//! History core for kiroku documents.
//!
//! Every edit to a document is a content-addressed [`Change`] appended to a
//! per-device log. This crate turns the current set of log heads into an
//! in-memory DAG ready for replay:
//!
//! ```text
//!   RecordStore ──► ChangeLoader ──► resolver ──► DagBuilder ──► Tree
//!   (raw bytes)     (decode, cache)  (breakpoint)  (closure)     (canonical walk)
//! ```
//!
//! | Module       | Purpose                                          |
//! |--------------|--------------------------------------------------|
//! | [`change`]   | Stored record and decoded change                 |
//! | [`codec`]    | Record encoding, content addresses               |
//! | [`store`]    | `RecordStore` contract, in-memory store          |
//! | [`loader`]   | Pass-scoped loading with cancellation            |
//! | [`resolver`] | Breakpoint snapshot for a head set               |
//! | [`tree`]     | Incremental linking, head classification         |
//! | [`builder`]  | Build passes: full, before an id, details-only   |
//!
//! Everything here is single-threaded per document; only
//! [`ChangeLoader::load`] suspends.

pub mod builder;
pub mod change;
pub mod codec;
pub mod config;
pub mod error;
pub mod loader;
pub mod report;
pub mod resolver;
pub mod store;
pub mod tree;
mod walk;

pub use builder::{BuiltTree, DagBuilder, build_details_tree, build_tree, build_tree_before, project_details};
pub use change::{Change, ChangeRecord, Snapshot, encode_content};
pub use codec::{ChangeCodec, PostcardCodec, content_address};
pub use config::HistoryConfig;
pub use error::HistoryError;
pub use loader::ChangeLoader;
pub use report::{BuildReport, BuildWarning};
pub use resolver::{Resolution, common_snapshot, resolve_breakpoint};
pub use store::{HeadUpdate, Log, MemoryRecordStore, RawRecord, RecordSink, RecordStore, Subscribers};
pub use tree::{AddOutcome, Tree};

pub type Result<T> = std::result::Result<T, HistoryError>;
