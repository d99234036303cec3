//! Shared data types for kiroku.
//!
//! This crate is the vocabulary of the history core: change identifiers,
//! detail values, the block model, typed block updates, and the content
//! operations a change carries. It has **no internal kiroku dependencies**
//! and no behaviour beyond small accessors. Applying an operation lives in
//! `kiroku-state`; linking changes lives in `kiroku-history`.
//!
//! # Overview
//!
//! ```text
//! Change (ChangeId) ← content-addressed edit record
//!     └── previous_ids: parents in the history DAG
//!     └── snapshot?: BaseSnapshot + log heads
//!     └── content: [ChangeContent]
//!             └── BlockCreate / BlockMove / BlockRemove
//!             └── BlockUpdate → [BlockEvent { id, BlockUpdate }]
//!             └── Details*, Relation*, ObjectType*, SetFileInfo
//!
//! Block (String id) ← node of the document tree
//!     └── children_ids: ordered children
//!     └── content: BlockContent (Text, File, Layout, Dataview, ...)
//! ```
//!
//! # Key Types
//!
//! |--------------------|----------------------------------------------|
//! | Type               | Purpose                                      |
//! |--------------------|----------------------------------------------|
//! | [`ChangeId`]       | Cheap-to-clone content address of a change   |
//! | [`Value`]          | Detail / field value (struct-like JSON)      |
//! | [`Block`]          | One node of the document block tree          |
//! | [`BlockContent`]   | Tagged variant over every block kind         |
//! | [`BlockUpdate`]    | Typed partial update for one block           |
//! | [`ChangeContent`]  | One operation inside a change                |
//! | [`Position`]       | Where an insert lands relative to a target   |
//! | [`BaseSnapshot`]   | Full document base carried by snapshots      |
//! |--------------------|----------------------------------------------|

pub mod block;
pub mod content;
pub mod event;
pub mod ids;
pub mod keys;
pub mod snapshot;
pub mod value;

pub use block::{
    Align, Block, BlockContent, BlockKind, BookmarkContent, BookmarkState, DataviewContent,
    DivContent, DivStyle, EmbedContent, EmbedProcessor, FileContent, FileKind, FileState,
    Filter, LayoutContent, LayoutStyle, LinkCardStyle, LinkContent, LinkDescription,
    LinkIconSize, Mark, MarkKind, RelationContent, Sort, TableRowContent, TextContent,
    TextStyle, VerticalAlign, View, ViewKind, ViewRelation, WIDTH_FIELD, WidgetContent,
    WidgetLayout,
};
pub use content::{
    ChangeContent, FileInfo, FileKeys, Position, RelationFormat, RelationLink,
};
pub use event::{
    BlockEvent, BlockUpdate, BookmarkUpdate, DataviewUpdate, EmbedUpdate, FileUpdate,
    LinkUpdate, TextUpdate, WidgetUpdate,
};
pub use ids::ChangeId;
pub use snapshot::BaseSnapshot;
pub use value::{Details, Value};

/// Current time as Unix seconds. Used to stamp authored changes.
pub fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
