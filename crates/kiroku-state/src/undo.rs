//! Undo/redo history of applied actions.

use std::collections::VecDeque;

use kiroku_types::{Block, Details, RelationLink};

/// Default number of actions kept per document.
pub const UNDO_LIMIT: usize = 300;

/// A block before and after an apply.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockChange {
    pub before: Block,
    pub after: Block,
}

/// Reverse-op record of one apply.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Action {
    pub add: Vec<Block>,
    pub change: Vec<BlockChange>,
    pub remove: Vec<Block>,
    pub details: Option<(Details, Details)>,
    pub relations: Option<(Vec<RelationLink>, Vec<RelationLink>)>,
    pub object_types: Option<(Vec<String>, Vec<String>)>,
}

impl Action {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty()
            && self.change.is_empty()
            && self.remove.is_empty()
            && self.details.is_none()
            && self.relations.is_none()
            && self.object_types.is_none()
    }
}

/// Bounded list of actions with a cursor. Pushing after an undo drops the
/// redo tail.
#[derive(Clone, Debug)]
pub struct UndoHistory {
    actions: VecDeque<Action>,
    cursor: usize,
    limit: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::with_limit(UNDO_LIMIT)
    }
}

impl UndoHistory {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            actions: VecDeque::new(),
            cursor: 0,
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, action: Action) {
        if action.is_empty() {
            return;
        }
        self.actions.truncate(self.cursor);
        self.actions.push_back(action);
        while self.actions.len() > self.limit {
            self.actions.pop_front();
        }
        self.cursor = self.actions.len();
    }

    /// Steps back and returns the action to revert.
    pub fn undo(&mut self) -> Option<&Action> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.actions.get(self.cursor)
    }

    /// Steps forward and returns the action to re-apply.
    pub fn redo(&mut self) -> Option<&Action> {
        let action = self.actions.get(self.cursor)?;
        self.cursor += 1;
        Some(action)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.actions.len()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
