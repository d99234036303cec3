//! Folding a derived state into its parent.

use std::collections::HashSet;

use kiroku_types::{Block, Details};
use tracing::trace;

use crate::events::{ApplyResult, Event};
use crate::undo::{Action, BlockChange};
use crate::{DocumentState, StateError};

/// How much work an apply does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyMode {
    /// Normalize (optionally with layouts), refresh the snippet, diff, and
    /// record an undo action on the parent.
    Full { with_layouts: bool },
    /// Normalize without layouts and diff; no snippet, no undo entry.
    /// Used for every change during replay.
    Fast,
}

impl ApplyMode {
    fn with_layouts(&self) -> bool {
        matches!(self, ApplyMode::Full { with_layouts: true })
    }

    fn is_full(&self) -> bool {
        matches!(self, ApplyMode::Full { .. })
    }
}

fn same_attributes(a: &Block, b: &Block) -> bool {
    a.content == b.content
        && a.fields == b.fields
        && a.background_color == b.background_color
        && a.align == b.align
        && a.vertical_align == b.vertical_align
}

fn diff_details(before: &Details, after: &Details, local: bool, events: &mut Vec<Event>) {
    for (key, value) in after {
        if before.get(key) != Some(value) {
            let (key, value) = (key.clone(), value.clone());
            events.push(if local {
                Event::LocalDetailsSet { key, value }
            } else {
                Event::DetailsSet { key, value }
            });
        }
    }
    let keys: Vec<String> = before.keys().filter(|k| !after.contains_key(*k)).cloned().collect();
    if !keys.is_empty() {
        events.push(if local {
            Event::LocalDetailsUnset { keys }
        } else {
            Event::DetailsUnset { keys }
        });
    }
}

impl DocumentState {
    /// Normalizes this state and folds it into its parent, returning the
    /// parent together with the events and undo action of the fold.
    ///
    /// A state without a parent is normalized in place and returned with an
    /// empty result.
    pub fn apply(mut self, mode: ApplyMode) -> Result<(DocumentState, ApplyResult), StateError> {
        self.normalize(mode.with_layouts())?;
        if mode.is_full() {
            self.update_snippet();
        }
        if !self.has_parent() {
            return Ok((self, ApplyResult::default()));
        }

        // Reachability of the combined view decides what survives.
        let order = self.tree_ids();
        let in_use: HashSet<&str> = order.iter().map(String::as_str).collect();
        let before_in_use = self.parent().map(DocumentState::in_use_ids).unwrap_or_default();
        let Some(parent) = self.parent.take() else {
            return Ok((self, ApplyResult::default()));
        };
        let mut parent = *parent;

        let mut events = Vec::new();
        let mut action = Action::default();

        for id in &order {
            let Some(after) = self.blocks.get(id) else { continue };
            match parent.pick(id) {
                None => action.add.push(after.clone()),
                Some(before) if before != after => {
                    if !same_attributes(before, after) {
                        events.push(Event::BlockSet { block: after.clone() });
                    }
                    if before.children_ids != after.children_ids {
                        events.push(Event::BlockSetChildren {
                            id: id.clone(),
                            children_ids: after.children_ids.clone(),
                        });
                    }
                    action.change.push(BlockChange {
                        before: before.clone(),
                        after: after.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        if !action.add.is_empty() {
            events.insert(0, Event::BlockAdd {
                blocks: action.add.clone(),
            });
        }

        let mut removed: Vec<String> = before_in_use
            .iter()
            .filter(|id| !in_use.contains(id.as_str()))
            .cloned()
            .collect();
        removed.sort();
        for id in &removed {
            if let Some(block) = parent.pick(id) {
                action.remove.push(block.clone());
            }
        }
        if !removed.is_empty() {
            events.push(Event::BlockDelete { ids: removed });
        }
        parent.blocks.retain(|id, _| in_use.contains(id.as_str()));
        for (id, block) in self.blocks.drain() {
            if in_use.contains(id.as_str()) {
                parent.blocks.insert(id, block);
            }
        }

        if let Some(details) = self.details.take() {
            let before = parent.details().clone();
            if details != before {
                diff_details(&before, &details, false, &mut events);
                action.details = Some((before, details.clone()));
                parent.details = Some(details);
            }
        }
        if let Some(local) = self.local_details.take() {
            let before = parent.local_details().clone();
            if local != before {
                diff_details(&before, &local, true, &mut events);
                parent.local_details = Some(local);
            }
        }
        if let Some(links) = self.relation_links.take() {
            if links != parent.relation_links() {
                events.push(Event::RelationLinksChanged { links: links.clone() });
                action.relations = Some((parent.relation_links().to_vec(), links.clone()));
                parent.relation_links = Some(links);
            }
        }
        if let Some(types) = self.object_types.take() {
            if types != parent.object_types() {
                events.push(Event::ObjectTypesChanged { types: types.clone() });
                action.object_types = Some((parent.object_types().to_vec(), types.clone()));
                parent.object_types = Some(types);
            }
        }
        if let Some(info) = self.file_info.take() {
            if parent.file_info() != Some(&info) {
                events.push(Event::FileInfoChanged { info: info.clone() });
                parent.file_info = Some(info);
            }
        }
        parent.file_keys.append(&mut self.file_keys);
        if let Some(id) = self.change_id.take() {
            parent.change_id = Some(id);
        }

        trace!(events = events.len(), "state applied");
        if mode.is_full() {
            parent.undo.push(action.clone());
        }
        Ok((parent, ApplyResult { events, action }))
    }
}
