//! Placing blocks relative to a target.

use kiroku_types::{Block, LayoutStyle, Position};

use crate::{DocumentState, StateError};

/// Short stable id fragment for layout blocks derived from one insert.
pub(crate) fn derived_id(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    hex::encode(&hasher.finalize().as_bytes()[..8])
}

impl DocumentState {
    /// Inserts `ids` next to `target_id` according to `position`.
    ///
    /// The ids must already exist and be detached. An empty target means the
    /// end of the root.
    pub fn insert_to(&mut self, target_id: &str, position: Position, ids: &[String]) -> Result<(), StateError> {
        if ids.is_empty() {
            return Ok(());
        }
        let (target_id, position) = if target_id.is_empty() {
            (self.root_id.clone(), Position::Inner)
        } else {
            (target_id.to_string(), position)
        };
        if !self.exists(&target_id) {
            return Err(StateError::BlockNotFound(target_id));
        }

        match position {
            Position::Inner => {
                let target = self.block_mut(&target_id)?;
                target.children_ids.extend(ids.iter().cloned());
            }
            Position::InnerFirst => {
                let target = self.block_mut(&target_id)?;
                target.children_ids.splice(0..0, ids.iter().cloned());
            }
            Position::Top | Position::Bottom | Position::Replace => {
                let parent_id = self
                    .parent_id_of(&target_id)
                    .ok_or_else(|| StateError::NoParent(target_id.clone()))?;
                let parent = self.block_mut(&parent_id)?;
                let Some(index) = parent.children_ids.iter().position(|c| *c == target_id) else {
                    return Err(StateError::NoParent(target_id));
                };
                match position {
                    Position::Top => {
                        parent.children_ids.splice(index..index, ids.iter().cloned());
                    }
                    Position::Bottom => {
                        parent.children_ids.splice(index + 1..index + 1, ids.iter().cloned());
                    }
                    _ => {
                        // Replace always vacates the slot. An empty first
                        // replacement takes over the target's children;
                        // otherwise the old subtree is dropped with the target.
                        parent.children_ids.splice(index..=index, ids.iter().cloned());
                        self.inherit_children(&target_id, &ids[0])?;
                    }
                }
            }
            Position::Left | Position::Right => self.insert_side(&target_id, position, ids)?,
        }
        Ok(())
    }

    fn block_mut(&mut self, id: &str) -> Result<&mut Block, StateError> {
        self.get_mut(id).ok_or_else(|| StateError::BlockNotFound(id.to_string()))
    }

    /// The replaced target hands its children to the first replacement when
    /// that block brought none of its own.
    fn inherit_children(&mut self, target_id: &str, heir_id: &str) -> Result<(), StateError> {
        if target_id == heir_id {
            return Ok(());
        }
        let heir_empty = self.pick(heir_id).is_some_and(|b| b.children_ids.is_empty());
        let inherited = self.pick(target_id).map(|b| b.children_ids.clone()).unwrap_or_default();
        if !heir_empty || inherited.is_empty() {
            return Ok(());
        }
        self.block_mut(target_id)?.children_ids.clear();
        self.block_mut(heir_id)?.children_ids = inherited;
        Ok(())
    }

    /// Left/Right: put `ids` in a new column beside the column holding the
    /// target, wrapping the target in a row first when needed.
    fn insert_side(&mut self, target_id: &str, position: Position, ids: &[String]) -> Result<(), StateError> {
        let mut parts = vec![target_id, position.as_ref()];
        parts.extend(ids.iter().map(String::as_str));
        let op = derived_id(&parts);

        let column_id = format!("ct-{op}");
        if self.exists(&column_id) {
            return Err(StateError::DuplicateBlock(column_id));
        }

        let (row_id, anchor_id) = match self.side_anchor(target_id) {
            Some(found) => found,
            None => self.wrap_in_row(target_id, &op)?,
        };

        self.set(Block::layout(column_id.clone(), LayoutStyle::Column).with_children(ids.iter().cloned()));
        let row = self.block_mut(&row_id)?;
        let index = row
            .children_ids
            .iter()
            .position(|c| *c == anchor_id)
            .ok_or_else(|| StateError::BlockNotFound(anchor_id.clone()))?;
        let at = if position == Position::Left { index } else { index + 1 };
        row.children_ids.insert(at, column_id);
        Ok(())
    }

    /// Existing (row, column) pair the target already lives in.
    fn side_anchor(&self, target_id: &str) -> Option<(String, String)> {
        let target = self.pick(target_id)?;
        let parent_id = self.parent_id_of(target_id)?;
        let parent = self.pick(&parent_id)?;
        if target.is_layout(LayoutStyle::Column) && parent.is_layout(LayoutStyle::Row) {
            return Some((parent_id, target_id.to_string()));
        }
        if parent.is_layout(LayoutStyle::Column) {
            let row_id = self.parent_id_of(&parent_id)?;
            if self.pick(&row_id)?.is_layout(LayoutStyle::Row) {
                return Some((row_id, parent_id));
            }
        }
        None
    }

    /// Replaces the target in its parent with `Row { Column { target } }`.
    fn wrap_in_row(&mut self, target_id: &str, op: &str) -> Result<(String, String), StateError> {
        let row_id = format!("r-{op}");
        let column_id = format!("cd-{op}");
        for id in [&row_id, &column_id] {
            if self.exists(id) {
                return Err(StateError::DuplicateBlock(id.clone()));
            }
        }
        let parent_id = self
            .parent_id_of(target_id)
            .ok_or_else(|| StateError::NoParent(target_id.to_string()))?;
        let parent = self.block_mut(&parent_id)?;
        let slot = parent
            .children_ids
            .iter_mut()
            .find(|c| c.as_str() == target_id)
            .ok_or_else(|| StateError::NoParent(target_id.to_string()))?;
        *slot = row_id.clone();

        self.set(Block::layout(row_id.clone(), LayoutStyle::Row).with_children([column_id.clone()]));
        self.set(Block::layout(column_id.clone(), LayoutStyle::Column).with_children([target_id]));
        Ok((row_id, column_id))
    }
}
