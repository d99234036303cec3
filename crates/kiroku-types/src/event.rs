//! Typed block updates.
//!
//! `BlockUpdate` operations carry a list of [`BlockEvent`]s, each addressing
//! one block with a partial update for exactly one content variant. Partial
//! structs use `Option` per field: `None` leaves the field untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::block::{
    Align, BookmarkState, DivStyle, EmbedProcessor, FileKind, FileState, Filter,
    LinkCardStyle, LinkDescription, LinkIconSize, Mark, Sort, TextStyle, VerticalAlign, View,
    ViewKind, ViewRelation, WidgetLayout,
};
use crate::content::RelationLink;
use crate::value::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockEvent {
    pub id: String,
    pub update: BlockUpdate,
}

impl BlockEvent {
    pub fn new(id: impl Into<String>, update: BlockUpdate) -> Self {
        Self {
            id: id.into(),
            update,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BlockUpdate {
    // Base attributes, valid on every kind.
    Fields(BTreeMap<String, Value>),
    BackgroundColor(String),
    Align(Align),
    VerticalAlign(VerticalAlign),

    // Variant-specific.
    Text(TextUpdate),
    File(FileUpdate),
    Bookmark(BookmarkUpdate),
    Link(LinkUpdate),
    Div(DivStyle),
    Widget(WidgetUpdate),
    TableRow { is_header: bool },
    Embed(EmbedUpdate),
    Relation { key: String },
    Dataview(DataviewUpdate),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUpdate {
    pub text: Option<String>,
    pub style: Option<TextStyle>,
    pub marks: Option<Vec<Mark>>,
    pub checked: Option<bool>,
    pub color: Option<String>,
    pub icon_emoji: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdate {
    pub hash: Option<String>,
    pub name: Option<String>,
    pub kind: Option<FileKind>,
    pub mime: Option<String>,
    pub size: Option<u64>,
    pub state: Option<FileState>,
    pub target_object_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkUpdate {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_hash: Option<String>,
    pub favicon_hash: Option<String>,
    pub target_object_id: Option<String>,
    pub state: Option<BookmarkState>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkUpdate {
    pub target_block_id: Option<String>,
    pub icon_size: Option<LinkIconSize>,
    pub card_style: Option<LinkCardStyle>,
    pub description: Option<LinkDescription>,
    pub relations: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetUpdate {
    pub layout: Option<WidgetLayout>,
    pub limit: Option<u32>,
    pub view_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedUpdate {
    pub text: Option<String>,
    pub processor: Option<EmbedProcessor>,
}

/// Dataview updates address a view by id where relevant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DataviewUpdate {
    /// Insert or replace a whole view.
    ViewSet { view: View },
    ViewUpdate {
        view_id: String,
        name: Option<String>,
        kind: Option<ViewKind>,
        page_limit: Option<u32>,
        group_relation_key: Option<String>,
    },
    ViewDelete { view_id: String },
    /// Reorder views; ids missing from the list keep their relative order at the end.
    ViewOrder { view_ids: Vec<String> },
    SortsSet { view_id: String, sorts: Vec<Sort> },
    FiltersSet { view_id: String, filters: Vec<Filter> },
    ViewRelationsSet { view_id: String, relations: Vec<ViewRelation> },
    SourceSet { source: Vec<String> },
    TargetObjectIdSet { target_object_id: String },
    IsCollectionSet { is_collection: bool },
    RelationLinksAdd { links: Vec<RelationLink> },
    RelationLinksRemove { keys: Vec<String> },
}
