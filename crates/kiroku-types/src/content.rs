//! Change content operations.
//!
//! A change carries an ordered list of [`ChangeContent`] operations. They are
//! pure data: the dispatcher that applies them lives in `kiroku-state`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::block::Block;
use crate::event::BlockEvent;
use crate::value::Value;

/// Where inserted blocks land relative to a target block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Position {
    /// Before the target, same parent.
    Top,
    /// After the target, same parent.
    Bottom,
    /// Appended to the target's children.
    Inner,
    /// Prepended to the target's children.
    InnerFirst,
    /// In a new column left of the target.
    Left,
    /// In a new column right of the target.
    Right,
    /// In place of the target.
    Replace,
}

impl Position {
    pub fn is_side(&self) -> bool {
        matches!(self, Position::Left | Position::Right)
    }

    /// Positions that insert into the target's parent rather than the target.
    pub fn needs_parent(&self) -> bool {
        !matches!(self, Position::Inner | Position::InnerFirst)
    }
}

/// One operation inside a change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ChangeContent {
    BlockCreate {
        target_id: String,
        position: Position,
        blocks: Vec<Block>,
    },
    BlockMove {
        target_id: String,
        position: Position,
        ids: Vec<String>,
    },
    BlockRemove {
        ids: Vec<String>,
    },
    BlockUpdate {
        events: Vec<BlockEvent>,
    },
    DetailsSet {
        key: String,
        value: Value,
    },
    DetailsUnset {
        key: String,
    },
    RelationAdd {
        links: Vec<RelationLink>,
    },
    RelationRemove {
        keys: Vec<String>,
    },
    /// Replace the format of already linked relations.
    RelationUpdate {
        links: Vec<RelationLink>,
    },
    ObjectTypeAdd {
        url: String,
    },
    ObjectTypeRemove {
        url: String,
    },
    SetFileInfo {
        info: FileInfo,
    },
}

impl ChangeContent {
    /// Operation family name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ChangeContent::BlockCreate { .. } => "block_create",
            ChangeContent::BlockMove { .. } => "block_move",
            ChangeContent::BlockRemove { .. } => "block_remove",
            ChangeContent::BlockUpdate { .. } => "block_update",
            ChangeContent::DetailsSet { .. } => "details_set",
            ChangeContent::DetailsUnset { .. } => "details_unset",
            ChangeContent::RelationAdd { .. } => "relation_add",
            ChangeContent::RelationRemove { .. } => "relation_remove",
            ChangeContent::RelationUpdate { .. } => "relation_update",
            ChangeContent::ObjectTypeAdd { .. } => "object_type_add",
            ChangeContent::ObjectTypeRemove { .. } => "object_type_remove",
            ChangeContent::SetFileInfo { .. } => "set_file_info",
        }
    }

    /// Details, relation, and object-type operations make a change part of
    /// the details tree.
    pub fn is_details_meta(&self) -> bool {
        matches!(
            self,
            ChangeContent::DetailsSet { .. }
                | ChangeContent::DetailsUnset { .. }
                | ChangeContent::RelationAdd { .. }
                | ChangeContent::RelationRemove { .. }
                | ChangeContent::RelationUpdate { .. }
                | ChangeContent::ObjectTypeAdd { .. }
                | ChangeContent::ObjectTypeRemove { .. }
        )
    }

    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ChangeContent::BlockCreate { .. }
                | ChangeContent::BlockMove { .. }
                | ChangeContent::BlockRemove { .. }
        )
    }
}

/// A relation attached to the object, identified by key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationLink {
    pub key: String,
    pub format: RelationFormat,
}

impl RelationLink {
    pub fn new(key: impl Into<String>, format: RelationFormat) -> Self {
        Self {
            key: key.into(),
            format,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RelationFormat {
    #[default]
    LongText,
    ShortText,
    Number,
    Status,
    Tag,
    Date,
    File,
    Checkbox,
    Url,
    Email,
    Phone,
    Emoji,
    Object,
    Relations,
}

/// File info of a file-backed object. Replaced wholesale by `SetFileInfo`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub hash: String,
    /// Path inside the file DAG → encryption key.
    pub encryption_keys: BTreeMap<String, String>,
}

/// Encryption keys for one file, declared by the change that added it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileKeys {
    pub hash: String,
    pub keys: BTreeMap<String, String>,
}
