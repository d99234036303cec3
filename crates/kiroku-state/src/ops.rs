//! Change content dispatcher.
//!
//! Every [`ChangeContent`] op runs inside its own nested state. A failing op
//! (or one that leaves a cycle behind) is dropped whole and the state is left
//! exactly as it was before the op.

use std::collections::HashSet;

use kiroku_types::ChangeContent;
use tracing::{debug, warn};

use crate::{DocumentState, StateError};

impl DocumentState {
    /// Applies one op atomically.
    pub fn apply_change(&mut self, content: &ChangeContent) -> Result<(), StateError> {
        let mut scratch = std::mem::take(self).new_state();
        let outcome = scratch.dispatch(content).and_then(|()| {
            if content.is_structural() {
                scratch.check_acyclic()
            } else {
                Ok(())
            }
        });
        match outcome {
            Ok(()) => {
                *self = scratch.merge_down();
                Ok(())
            }
            Err(err) => {
                *self = scratch.into_parent();
                Err(err)
            }
        }
    }

    /// Applies ops in order, skipping failures. Returns the number of ops
    /// that were skipped.
    pub fn apply_changes(&mut self, contents: &[ChangeContent]) -> usize {
        let mut skipped = 0;
        for content in contents {
            if let Err(err) = self.apply_change(content) {
                warn!(op = content.name(), error = %err, "change op skipped");
                skipped += 1;
            }
        }
        skipped
    }

    fn dispatch(&mut self, content: &ChangeContent) -> Result<(), StateError> {
        match content {
            ChangeContent::BlockCreate {
                target_id,
                position,
                blocks,
            } => {
                // Detach everything first so holders created by this batch keep
                // the children they list.
                let mut inserted = Vec::with_capacity(blocks.len());
                for block in blocks {
                    if block.id != self.root_id {
                        self.unlink(&block.id);
                        inserted.push(block.id.clone());
                    }
                }
                for block in blocks {
                    if block.id == self.root_id && self.exists(&block.id) {
                        debug!(id = %block.id, "root already exists, create ignored");
                        continue;
                    }
                    self.set(block.clone());
                }
                // Blocks listed as children inside the batch are placed by their parent.
                let nested: HashSet<&str> = blocks
                    .iter()
                    .flat_map(|b| b.children_ids.iter().map(String::as_str))
                    .collect();
                inserted.retain(|id| !nested.contains(id.as_str()));
                self.insert_to(target_id, *position, &inserted)
            }
            ChangeContent::BlockMove {
                target_id,
                position,
                ids,
            } => {
                let target_parent = self.parent_id_of(target_id);
                for id in ids {
                    if id == target_id || target_parent.as_deref() == Some(id.as_str()) {
                        return Err(StateError::InvalidMove {
                            id: id.clone(),
                            target: target_id.clone(),
                        });
                    }
                    if !self.exists(id) {
                        return Err(StateError::BlockNotFound(id.clone()));
                    }
                    if self.is_descendant(id, target_id) {
                        return Err(StateError::CycleDetected(id.clone()));
                    }
                }
                for id in ids {
                    self.unlink(id);
                }
                self.insert_to(target_id, *position, ids)
            }
            ChangeContent::BlockRemove { ids } => {
                for id in ids {
                    self.unlink(id);
                    self.cleanup_block(id);
                }
                Ok(())
            }
            ChangeContent::BlockUpdate { events } => {
                for event in events {
                    let block = self
                        .get_mut(&event.id)
                        .ok_or_else(|| StateError::BlockNotFound(event.id.clone()))?;
                    crate::update::apply_update(block, &event.update)?;
                }
                Ok(())
            }
            ChangeContent::DetailsSet { key, value } => {
                self.set_detail(key.clone(), value.clone());
                Ok(())
            }
            ChangeContent::DetailsUnset { key } => {
                self.remove_detail(key);
                Ok(())
            }
            ChangeContent::RelationAdd { links } => {
                self.add_relation_links(links);
                Ok(())
            }
            ChangeContent::RelationRemove { keys } => {
                self.remove_relations(keys);
                Ok(())
            }
            ChangeContent::RelationUpdate { links } => {
                self.update_relation_links(links);
                Ok(())
            }
            ChangeContent::ObjectTypeAdd { url } => {
                self.add_object_type(url);
                Ok(())
            }
            ChangeContent::ObjectTypeRemove { url } => {
                if !self.remove_object_type(url) {
                    warn!(url = %url, "object type to remove not found");
                }
                Ok(())
            }
            ChangeContent::SetFileInfo { info } => {
                self.set_file_info(info.clone());
                Ok(())
            }
        }
    }

    /// Fails when a block touched in this overlay can reach itself.
    fn check_acyclic(&self) -> Result<(), StateError> {
        let mut done: HashSet<&str> = HashSet::new();
        let mut starts: Vec<&str> = self.blocks.keys().map(String::as_str).collect();
        starts.sort_unstable();
        for start in starts {
            if done.contains(start) {
                continue;
            }
            // Iterative DFS; the bool marks "children already pushed".
            let mut on_path: HashSet<&str> = HashSet::new();
            let mut stack: Vec<(&str, bool)> = vec![(start, false)];
            while let Some((id, expanded)) = stack.pop() {
                if expanded {
                    on_path.remove(id);
                    done.insert(id);
                    continue;
                }
                if done.contains(id) {
                    continue;
                }
                if !on_path.insert(id) {
                    return Err(StateError::CycleDetected(id.to_string()));
                }
                stack.push((id, true));
                if let Some(block) = self.pick(id) {
                    for child in &block.children_ids {
                        if on_path.contains(child.as_str()) {
                            return Err(StateError::CycleDetected(child.clone()));
                        }
                        if !done.contains(child.as_str()) {
                            stack.push((child.as_str(), false));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiroku_types::{Block, BlockEvent, BlockUpdate, LayoutStyle, Position, TextUpdate, Value};

    fn doc() -> DocumentState {
        DocumentState::with_blocks(
            "root",
            [
                Block::new("root", Default::default()).with_children(["a", "b"]),
                Block::text("a", "").with_children(["a1"]),
                Block::text("a1", "").with_children(["a2"]),
                Block::text("a2", ""),
                Block::text("b", ""),
            ],
        )
        .new_state()
    }

    fn children(state: &DocumentState, id: &str) -> Vec<String> {
        state.pick(id).map(|b| b.children_ids.clone()).unwrap_or_default()
    }

    #[test]
    fn test_create_nested_batch() {
        let mut state = doc();
        state
            .apply_change(&ChangeContent::BlockCreate {
                target_id: "b".into(),
                position: Position::Bottom,
                blocks: vec![Block::text("p", "").with_children(["q"]), Block::text("q", "")],
            })
            .unwrap();
        assert_eq!(children(&state, "root"), vec!["a", "b", "p"]);
        assert_eq!(children(&state, "p"), vec!["q"]);
    }

    #[test]
    fn test_create_nested_layout_keeps_hierarchy() {
        let mut state = doc();
        state
            .apply_change(&ChangeContent::BlockCreate {
                target_id: "a".into(),
                position: Position::Bottom,
                blocks: vec![
                    Block::layout("row", LayoutStyle::Row).with_children(["c1", "c2"]),
                    Block::layout("c1", LayoutStyle::Column).with_children(["t1"]),
                    Block::layout("c2", LayoutStyle::Column).with_children(["t2"]),
                    Block::text("t1", "left"),
                    Block::text("t2", "right"),
                ],
            })
            .unwrap();
        assert_eq!(children(&state, "root"), vec!["a", "row", "b"]);
        assert_eq!(children(&state, "row"), vec!["c1", "c2"]);
        assert_eq!(children(&state, "c1"), vec!["t1"]);
        assert_eq!(children(&state, "c2"), vec!["t2"]);

        // Nothing here is empty, so normalization keeps the whole nest.
        let (state, _) = state.apply(crate::ApplyMode::Fast).unwrap();
        assert_eq!(children(&state, "root"), vec!["a", "row", "b"]);
        assert_eq!(children(&state, "row"), vec!["c1", "c2"]);
        assert_eq!(children(&state, "c2"), vec!["t2"]);
    }

    #[test]
    fn test_create_reuses_existing_child_id() {
        // `a2` already lives under `a1`; the batch moves it under the new `p`.
        let mut state = doc();
        state
            .apply_change(&ChangeContent::BlockCreate {
                target_id: "b".into(),
                position: Position::Bottom,
                blocks: vec![Block::text("p", "").with_children(["a2"]), Block::text("a2", "again")],
            })
            .unwrap();
        assert_eq!(children(&state, "a1"), Vec::<String>::new());
        assert_eq!(children(&state, "p"), vec!["a2"]);
        assert_eq!(children(&state, "root"), vec!["a", "b", "p"]);
    }

    #[test]
    fn test_create_existing_root_is_ignored() {
        let mut state = doc();
        state
            .apply_change(&ChangeContent::BlockCreate {
                target_id: String::new(),
                position: Position::Inner,
                blocks: vec![Block::new("root", Default::default())],
            })
            .unwrap();
        assert_eq!(children(&state, "root"), vec!["a", "b"]);
    }

    #[test]
    fn test_move_into_own_child_is_cycle() {
        let mut state = doc();
        let err = state
            .apply_change(&ChangeContent::BlockMove {
                target_id: "a2".into(),
                position: Position::Inner,
                ids: vec!["a".into()],
            })
            .unwrap_err();
        assert_eq!(err, StateError::CycleDetected("a".into()));
        assert_eq!(children(&state, "root"), vec!["a", "b"]);
    }

    #[test]
    fn test_move_onto_itself_is_invalid() {
        let mut state = doc();
        let err = state
            .apply_change(&ChangeContent::BlockMove {
                target_id: "a".into(),
                position: Position::Bottom,
                ids: vec!["a".into()],
            })
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidMove { .. }));
    }

    #[test]
    fn test_move() {
        let mut state = doc();
        state
            .apply_change(&ChangeContent::BlockMove {
                target_id: "b".into(),
                position: Position::Inner,
                ids: vec!["a1".into()],
            })
            .unwrap();
        assert!(children(&state, "a").is_empty());
        assert_eq!(children(&state, "b"), vec!["a1"]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut state = doc();
        let remove = ChangeContent::BlockRemove { ids: vec!["b".into()] };
        state.apply_change(&remove).unwrap();
        state.apply_change(&remove).unwrap();
        assert_eq!(children(&state, "root"), vec!["a"]);
    }

    #[test]
    fn test_created_cycle_is_reverted() {
        let mut state = doc();
        let err = state
            .apply_change(&ChangeContent::BlockCreate {
                target_id: "b".into(),
                position: Position::Inner,
                blocks: vec![Block::text("x", "").with_children(["b"])],
            })
            .unwrap_err();
        assert!(matches!(err, StateError::CycleDetected(_)));
        assert!(!state.exists("x"));
        assert!(children(&state, "b").is_empty());
    }

    #[test]
    fn test_failed_update_reverts_whole_op() {
        let mut state = doc();
        let ops = [ChangeContent::BlockUpdate {
            events: vec![
                BlockEvent::new("a", BlockUpdate::BackgroundColor("red".into())),
                BlockEvent::new("missing", BlockUpdate::Text(TextUpdate::default())),
            ],
        }];
        assert_eq!(state.apply_changes(&ops), 1);
        assert_eq!(state.pick("a").unwrap().background_color, "");
    }

    #[test]
    fn test_details_ops() {
        let mut state = doc();
        let ops = [
            ChangeContent::DetailsSet {
                key: "name".into(),
                value: Value::from("page"),
            },
            ChangeContent::ObjectTypeAdd { url: "_otnote".into() },
            ChangeContent::DetailsUnset { key: "missing".into() },
        ];
        assert_eq!(state.apply_changes(&ops), 0);
        assert_eq!(state.detail("name"), Some(&Value::from("page")));
        assert_eq!(state.object_types(), ["note".to_string()]);
    }
}
