//! Document base carried by snapshot changes.

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::content::{FileInfo, RelationLink};
use crate::value::Details;

/// Everything needed to start a replay without older history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseSnapshot {
    /// Blocks in tree order; the document root comes first.
    pub blocks: Vec<Block>,
    pub details: Details,
    pub relation_links: Vec<RelationLink>,
    pub object_types: Vec<String>,
    pub file_info: Option<FileInfo>,
}

impl BaseSnapshot {
    pub fn block(&self, id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }
}
