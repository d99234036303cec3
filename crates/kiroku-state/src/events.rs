//! Events emitted by an apply.

use serde::Serialize;

use kiroku_types::{Block, FileInfo, RelationLink, Value};

use crate::undo::Action;

/// What a client would need to mirror the state change.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    BlockAdd { blocks: Vec<Block> },
    /// Content or attributes of an existing block changed.
    BlockSet { block: Block },
    BlockSetChildren { id: String, children_ids: Vec<String> },
    BlockDelete { ids: Vec<String> },
    DetailsSet { key: String, value: Value },
    DetailsUnset { keys: Vec<String> },
    LocalDetailsSet { key: String, value: Value },
    LocalDetailsUnset { keys: Vec<String> },
    RelationLinksChanged { links: Vec<RelationLink> },
    ObjectTypesChanged { types: Vec<String> },
    FileInfoChanged { info: FileInfo },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::BlockAdd { .. } => "block_add",
            Event::BlockSet { .. } => "block_set",
            Event::BlockSetChildren { .. } => "block_set_children",
            Event::BlockDelete { .. } => "block_delete",
            Event::DetailsSet { .. } => "details_set",
            Event::DetailsUnset { .. } => "details_unset",
            Event::LocalDetailsSet { .. } => "local_details_set",
            Event::LocalDetailsUnset { .. } => "local_details_unset",
            Event::RelationLinksChanged { .. } => "relation_links_changed",
            Event::ObjectTypesChanged { .. } => "object_types_changed",
            Event::FileInfoChanged { .. } => "file_info_changed",
        }
    }
}

/// Outcome of folding a derived state into its parent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplyResult {
    pub events: Vec<Event>,
    pub action: Action,
}

impl ApplyResult {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.action.is_empty()
    }
}
