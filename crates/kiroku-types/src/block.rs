//! Block model.
//!
//! A document is a tree of blocks keyed by string id. Every block names its
//! children as an ordered sequence; the tree is rooted at the document's root
//! block. The concrete kind of a block is the [`BlockContent`] variant, so the
//! set of kinds is closed and every match over it is checked by the compiler.
//!
//! Encodings must stay non-self-describing friendly (postcard): no
//! `skip_serializing_if`, no untagged enums.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::content::RelationLink;
use crate::value::Value;

/// Field key holding a column's relative width inside a row.
pub const WIDTH_FIELD: &str = "width";

/// One node of the document tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub children_ids: Vec<String>,
    /// Free-form per-block fields (e.g. column `width`).
    pub fields: BTreeMap<String, Value>,
    pub background_color: String,
    pub align: Align,
    pub vertical_align: VerticalAlign,
    pub content: BlockContent,
}

impl Block {
    pub fn new(id: impl Into<String>, content: BlockContent) -> Self {
        Self {
            id: id.into(),
            content,
            ..Default::default()
        }
    }

    /// Builder-style children assignment.
    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children_ids = children.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// A plain paragraph text block.
    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            id,
            BlockContent::Text(TextContent {
                text: text.into(),
                ..Default::default()
            }),
        )
    }

    pub fn layout(id: impl Into<String>, style: LayoutStyle) -> Self {
        Self::new(id, BlockContent::Layout(LayoutContent { style }))
    }

    pub fn kind(&self) -> BlockKind {
        self.content.kind()
    }

    pub fn layout_style(&self) -> Option<LayoutStyle> {
        match &self.content {
            BlockContent::Layout(layout) => Some(layout.style),
            _ => None,
        }
    }

    pub fn is_layout(&self, style: LayoutStyle) -> bool {
        self.layout_style() == Some(style)
    }

    /// `Div` wrappers are structural only and may be flattened away.
    pub fn is_div_wrapper(&self) -> bool {
        self.is_layout(LayoutStyle::Div)
    }
}

/// Tagged variant over every block kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum BlockContent {
    /// The object root.
    #[default]
    Smartblock,
    Text(TextContent),
    File(FileContent),
    Bookmark(BookmarkContent),
    Link(LinkContent),
    Layout(LayoutContent),
    /// Visual divider (line / dots), not to be confused with `Div` layouts.
    Div(DivContent),
    Dataview(DataviewContent),
    Widget(WidgetContent),
    Table,
    TableRow(TableRowContent),
    Embed(EmbedContent),
    Relation(RelationContent),
}

impl BlockContent {
    pub fn kind(&self) -> BlockKind {
        match self {
            BlockContent::Smartblock => BlockKind::Smartblock,
            BlockContent::Text(_) => BlockKind::Text,
            BlockContent::File(_) => BlockKind::File,
            BlockContent::Bookmark(_) => BlockKind::Bookmark,
            BlockContent::Link(_) => BlockKind::Link,
            BlockContent::Layout(_) => BlockKind::Layout,
            BlockContent::Div(_) => BlockKind::Div,
            BlockContent::Dataview(_) => BlockKind::Dataview,
            BlockContent::Widget(_) => BlockKind::Widget,
            BlockContent::Table => BlockKind::Table,
            BlockContent::TableRow(_) => BlockKind::TableRow,
            BlockContent::Embed(_) => BlockKind::Embed,
            BlockContent::Relation(_) => BlockKind::Relation,
        }
    }
}

/// Kind tag of a block, for messages and rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum BlockKind {
    Smartblock,
    Text,
    File,
    Bookmark,
    Link,
    Layout,
    Div,
    Dataview,
    Widget,
    Table,
    TableRow,
    Embed,
    Relation,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum VerticalAlign {
    #[default]
    Top,
    Middle,
    Bottom,
}

// ── Text ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
    pub style: TextStyle,
    pub marks: Vec<Mark>,
    pub checked: bool,
    pub color: String,
    pub icon_emoji: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TextStyle {
    #[default]
    Paragraph,
    Header1,
    Header2,
    Header3,
    Title,
    Description,
    Quote,
    Code,
    Checkbox,
    Marked,
    Numbered,
    Toggle,
    Callout,
}

/// Formatting run over `[from, to)` in chars.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mark {
    pub from: u32,
    pub to: u32,
    pub kind: MarkKind,
    pub param: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MarkKind {
    Bold,
    Italic,
    Strikethrough,
    Keyboard,
    Underscored,
    Link,
    Mention,
    TextColor,
    BackgroundColor,
}

// ── File ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileContent {
    pub hash: String,
    pub name: String,
    pub kind: FileKind,
    pub mime: String,
    pub size: u64,
    pub state: FileState,
    pub target_object_id: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FileKind {
    #[default]
    File,
    Image,
    Video,
    Audio,
    Pdf,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FileState {
    #[default]
    Empty,
    Uploading,
    Done,
    Error,
}

// ── Bookmark ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkContent {
    pub url: String,
    pub title: String,
    pub description: String,
    pub image_hash: String,
    pub favicon_hash: String,
    pub target_object_id: String,
    pub state: BookmarkState,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum BookmarkState {
    #[default]
    Empty,
    Fetching,
    Done,
    Error,
}

// ── Link ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkContent {
    pub target_block_id: String,
    pub icon_size: LinkIconSize,
    pub card_style: LinkCardStyle,
    pub description: LinkDescription,
    /// Relation keys shown on the link card.
    pub relations: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum LinkIconSize {
    None,
    #[default]
    Small,
    Medium,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum LinkCardStyle {
    #[default]
    Text,
    Card,
    Inline,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum LinkDescription {
    #[default]
    None,
    Added,
    Content,
}

// ── Layout ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutContent {
    pub style: LayoutStyle,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum LayoutStyle {
    #[default]
    Row,
    Column,
    Div,
    Header,
    TableRows,
    TableColumns,
}

impl LayoutStyle {
    /// Table sections keep their wrapper even when empty.
    pub fn survives_empty(&self) -> bool {
        matches!(self, LayoutStyle::Header | LayoutStyle::TableRows | LayoutStyle::TableColumns)
    }
}

// ── Divider ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivContent {
    pub style: DivStyle,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum DivStyle {
    #[default]
    Line,
    Dots,
}

// ── Dataview ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataviewContent {
    /// Set-of-objects query source (type or relation keys).
    pub source: Vec<String>,
    pub views: Vec<View>,
    pub relation_links: Vec<RelationLink>,
    pub target_object_id: String,
    pub is_collection: bool,
}

impl DataviewContent {
    pub fn view(&self, id: &str) -> Option<&View> {
        self.views.iter().find(|v| v.id == id)
    }

    pub fn view_mut(&mut self, id: &str) -> Option<&mut View> {
        self.views.iter_mut().find(|v| v.id == id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub id: String,
    pub name: String,
    pub kind: ViewKind,
    pub sorts: Vec<Sort>,
    pub filters: Vec<Filter>,
    pub relations: Vec<ViewRelation>,
    pub group_relation_key: String,
    pub page_limit: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ViewKind {
    #[default]
    Table,
    List,
    Gallery,
    Kanban,
    Calendar,
    Graph,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub relation_key: String,
    pub descending: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub relation_key: String,
    pub condition: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRelation {
    pub key: String,
    pub is_visible: bool,
    pub width: u32,
}

// ── Widget ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetContent {
    pub layout: WidgetLayout,
    pub limit: u32,
    pub view_id: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum WidgetLayout {
    #[default]
    Link,
    Tree,
    List,
    CompactList,
}

// ── Table row, embed, relation ──────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRowContent {
    pub is_header: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedContent {
    pub text: String,
    pub processor: EmbedProcessor,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EmbedProcessor {
    #[default]
    Latex,
    Mermaid,
    Graphviz,
    Youtube,
    Excalidraw,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationContent {
    pub key: String,
}
