//! Copy-on-write document state.
//!
//! A [`DocumentState`] is a local overlay over an optional parent state.
//! Reads fall through the chain; writes copy the block into the overlay first.
//! [`DocumentState::apply`](crate::apply) folds an overlay back into its
//! parent and reports what changed.

use std::collections::{BTreeSet, HashMap, HashSet};

use kiroku_types::keys::{self, is_local_key, object_type_key};
use kiroku_types::{Block, ChangeId, Details, FileInfo, FileKeys, RelationLink, Value};

use crate::undo::UndoHistory;

static EMPTY_DETAILS: Details = Details::new();

#[derive(Debug, Default)]
pub struct DocumentState {
    pub(crate) parent: Option<Box<DocumentState>>,
    pub(crate) root_id: String,
    pub(crate) blocks: HashMap<String, Block>,
    pub(crate) details: Option<Details>,
    pub(crate) local_details: Option<Details>,
    pub(crate) relation_links: Option<Vec<RelationLink>>,
    pub(crate) object_types: Option<Vec<String>>,
    pub(crate) file_info: Option<FileInfo>,
    pub(crate) file_keys: Vec<FileKeys>,
    pub(crate) change_id: Option<ChangeId>,
    pub(crate) undo: UndoHistory,
}

impl DocumentState {
    /// An empty root state holding just the root block.
    pub fn new(root_id: impl Into<String>) -> Self {
        let root_id = root_id.into();
        let mut state = Self {
            root_id: root_id.clone(),
            ..Default::default()
        };
        state.blocks.insert(root_id.clone(), Block::new(root_id, Default::default()));
        state
    }

    /// A root state over existing blocks, no parent.
    pub fn with_blocks(root_id: impl Into<String>, blocks: impl IntoIterator<Item = Block>) -> Self {
        Self {
            root_id: root_id.into(),
            blocks: blocks.into_iter().map(|b| (b.id.clone(), b)).collect(),
            ..Default::default()
        }
    }

    /// Forks a derived state reading through `self`.
    pub fn new_state(self) -> DocumentState {
        DocumentState {
            root_id: self.root_id.clone(),
            parent: Some(Box::new(self)),
            ..Default::default()
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn parent(&self) -> Option<&DocumentState> {
        self.parent.as_deref()
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Drops the local overlay and returns the parent unchanged.
    pub fn into_parent(self) -> DocumentState {
        match self.parent {
            Some(parent) => *parent,
            None => self,
        }
    }

    /// Folds the overlay into the parent without diffing or events.
    ///
    /// Used for nested per-op states whose parent is itself an overlay.
    pub fn merge_down(mut self) -> DocumentState {
        let Some(mut parent) = self.parent.take().map(|p| *p) else {
            return self;
        };
        parent.blocks.extend(self.blocks.drain());
        if let Some(details) = self.details.take() {
            parent.details = Some(details);
        }
        if let Some(local) = self.local_details.take() {
            parent.local_details = Some(local);
        }
        if let Some(links) = self.relation_links.take() {
            parent.relation_links = Some(links);
        }
        if let Some(types) = self.object_types.take() {
            parent.object_types = Some(types);
        }
        if let Some(info) = self.file_info.take() {
            parent.file_info = Some(info);
        }
        parent.file_keys.append(&mut self.file_keys);
        if let Some(id) = self.change_id.take() {
            parent.change_id = Some(id);
        }
        parent
    }

    // ========================================================================
    // Blocks
    // ========================================================================

    /// Reads a block through the chain.
    pub fn pick(&self, id: &str) -> Option<&Block> {
        let mut state = self;
        loop {
            if let Some(block) = state.blocks.get(id) {
                return Some(block);
            }
            state = state.parent.as_deref()?;
        }
    }

    /// Reads a block as the parent chain sees it, ignoring the overlay.
    pub fn pick_origin(&self, id: &str) -> Option<&Block> {
        self.parent.as_deref()?.pick(id)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.pick(id).is_some()
    }

    /// Mutable access, copying the block into the overlay on first write.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Block> {
        if !self.blocks.contains_key(id) {
            let block = self.parent.as_deref()?.pick(id)?.clone();
            self.blocks.insert(id.to_string(), block);
        }
        self.blocks.get_mut(id)
    }

    pub fn set(&mut self, block: Block) {
        self.blocks.insert(block.id.clone(), block);
    }

    /// Inserts only when no block with that id is visible.
    pub fn add(&mut self, block: Block) -> bool {
        if self.exists(&block.id) {
            return false;
        }
        self.set(block);
        true
    }

    /// Drops a block from the overlay. Blocks owned by parents vanish at apply
    /// time once they are no longer reachable.
    pub fn cleanup_block(&mut self, id: &str) -> bool {
        self.blocks.remove(id).is_some()
    }

    /// Removes `id` from every children list that names it.
    pub fn unlink(&mut self, id: &str) -> bool {
        let holders: Vec<String> = self
            .known_ids()
            .into_iter()
            .filter(|candidate| {
                self.pick(candidate)
                    .is_some_and(|b| b.children_ids.iter().any(|c| c == id))
            })
            .collect();
        for holder in &holders {
            if let Some(block) = self.get_mut(holder) {
                block.children_ids.retain(|c| c != id);
            }
        }
        !holders.is_empty()
    }

    /// Id of the first block (tree order from root, then id order for
    /// detached blocks) that lists `id` as a child.
    pub fn parent_id_of(&self, id: &str) -> Option<String> {
        let mut found = None;
        self.iterate(|block| {
            if block.children_ids.iter().any(|c| c == id) {
                found = Some(block.id.clone());
                return false;
            }
            true
        });
        if found.is_some() {
            return found;
        }
        self.known_ids().into_iter().find(|candidate| {
            self.pick(candidate)
                .is_some_and(|b| b.children_ids.iter().any(|c| c == id))
        })
    }

    /// True when `id` sits somewhere below `ancestor`.
    pub fn is_descendant(&self, ancestor: &str, id: &str) -> bool {
        let mut stack: Vec<&str> = match self.pick(ancestor) {
            Some(block) => block.children_ids.iter().map(String::as_str).collect(),
            None => return false,
        };
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == id {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(block) = self.pick(current) {
                stack.extend(block.children_ids.iter().map(String::as_str));
            }
        }
        false
    }

    /// Pre-order walk from the root. Each block is visited once even if the
    /// tree is not yet normalized. Returning `false` stops the walk.
    pub fn iterate<'s, F>(&'s self, mut visit: F)
    where
        F: FnMut(&'s Block) -> bool,
    {
        let mut seen = HashSet::new();
        let mut stack = vec![self.root_id.as_str()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(block) = self.pick(id) else { continue };
            if !visit(block) {
                return;
            }
            stack.extend(block.children_ids.iter().rev().map(String::as_str));
        }
    }

    /// Ids reachable from the root.
    pub fn in_use_ids(&self) -> HashSet<String> {
        let mut ids = HashSet::new();
        self.iterate(|block| {
            ids.insert(block.id.clone());
            true
        });
        ids
    }

    /// Every block id visible through the chain, sorted.
    pub fn known_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        let mut state = Some(self);
        while let Some(current) = state {
            ids.extend(current.blocks.keys().cloned());
            state = current.parent.as_deref();
        }
        ids
    }

    /// Blocks of the local overlay only.
    pub fn local_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Number of blocks reachable from the root.
    pub fn len(&self) -> usize {
        self.in_use_ids().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.exists(&self.root_id)
    }

    // ========================================================================
    // Details
    // ========================================================================

    pub fn details(&self) -> &Details {
        let mut state = self;
        loop {
            if let Some(details) = &state.details {
                return details;
            }
            match state.parent.as_deref() {
                Some(parent) => state = parent,
                None => return &EMPTY_DETAILS,
            }
        }
    }

    pub fn local_details(&self) -> &Details {
        let mut state = self;
        loop {
            if let Some(details) = &state.local_details {
                return details;
            }
            match state.parent.as_deref() {
                Some(parent) => state = parent,
                None => return &EMPTY_DETAILS,
            }
        }
    }

    /// Looks a key up in local details first, then shared details.
    pub fn detail(&self, key: &str) -> Option<&Value> {
        if is_local_key(key) {
            self.local_details().get(key)
        } else {
            self.details().get(key)
        }
    }

    /// Sets a relation value; local keys go to the local details store.
    /// Setting `Value::Null` removes the key.
    pub fn set_detail(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let local = is_local_key(&key);
        let details = if local {
            self.local_details_mut()
        } else {
            self.details_mut()
        };
        if value.is_null() {
            details.remove(&key);
        } else {
            details.insert(key, value);
        }
    }

    pub fn remove_detail(&mut self, key: &str) {
        let details = if is_local_key(key) {
            self.local_details_mut()
        } else {
            self.details_mut()
        };
        details.remove(key);
    }

    pub(crate) fn details_mut(&mut self) -> &mut Details {
        if self.details.is_none() {
            self.details = Some(self.details().clone());
        }
        self.details.get_or_insert_with(Details::new)
    }

    pub(crate) fn local_details_mut(&mut self) -> &mut Details {
        if self.local_details.is_none() {
            self.local_details = Some(self.local_details().clone());
        }
        self.local_details.get_or_insert_with(Details::new)
    }

    /// Stamps the local last-modified relations.
    pub fn set_last_modified(&mut self, timestamp: i64, author: &str) {
        if timestamp > 0 {
            self.set_detail(keys::LAST_MODIFIED_DATE, Value::from(timestamp));
        }
        if !author.is_empty() {
            self.set_detail(keys::LAST_MODIFIED_BY, Value::from(author));
        }
    }

    // ========================================================================
    // Relations, object types, files
    // ========================================================================

    pub fn relation_links(&self) -> &[RelationLink] {
        let mut state = self;
        loop {
            if let Some(links) = &state.relation_links {
                return links;
            }
            match state.parent.as_deref() {
                Some(parent) => state = parent,
                None => return &[],
            }
        }
    }

    pub fn has_relation(&self, key: &str) -> bool {
        self.relation_links().iter().any(|l| l.key == key)
    }

    /// Appends links whose key is not linked yet.
    pub fn add_relation_links(&mut self, links: &[RelationLink]) {
        let mut current = self.relation_links().to_vec();
        for link in links {
            if !current.iter().any(|l| l.key == link.key) {
                current.push(link.clone());
            }
        }
        self.relation_links = Some(current);
    }

    /// Replaces the format of already linked relations; unknown keys are ignored.
    pub fn update_relation_links(&mut self, links: &[RelationLink]) {
        let mut current = self.relation_links().to_vec();
        for link in links {
            if let Some(existing) = current.iter_mut().find(|l| l.key == link.key) {
                existing.format = link.format;
            }
        }
        self.relation_links = Some(current);
    }

    /// Unlinks relations and clears their values.
    pub fn remove_relations(&mut self, keys: &[String]) {
        let mut current = self.relation_links().to_vec();
        current.retain(|l| !keys.contains(&l.key));
        self.relation_links = Some(current);
        for key in keys {
            self.remove_detail(key);
        }
    }

    pub fn object_types(&self) -> &[String] {
        let mut state = self;
        loop {
            if let Some(types) = &state.object_types {
                return types;
            }
            match state.parent.as_deref() {
                Some(parent) => state = parent,
                None => return &[],
            }
        }
    }

    pub fn set_object_types(&mut self, types: Vec<String>) {
        self.object_types = Some(types);
    }

    /// Adds a type by url or key. Returns false if it was already present.
    pub fn add_object_type(&mut self, url: &str) -> bool {
        let key = object_type_key(url);
        if self.object_types().iter().any(|t| t == key) {
            return false;
        }
        let mut types = self.object_types().to_vec();
        types.push(key.to_string());
        self.object_types = Some(types);
        true
    }

    /// Removes a type by url or key. Returns false if it was not present.
    pub fn remove_object_type(&mut self, url: &str) -> bool {
        let key = object_type_key(url);
        if !self.object_types().iter().any(|t| t == key) {
            return false;
        }
        let types = self.object_types().iter().filter(|t| *t != key).cloned().collect();
        self.object_types = Some(types);
        true
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        let mut state = self;
        loop {
            if let Some(info) = &state.file_info {
                return Some(info);
            }
            state = state.parent.as_deref()?;
        }
    }

    pub fn set_file_info(&mut self, info: FileInfo) {
        self.file_info = Some(info);
    }

    /// File keys absorbed by this state and its parents, oldest first.
    pub fn file_keys(&self) -> Vec<&FileKeys> {
        let mut chain = Vec::new();
        let mut state = Some(self);
        while let Some(current) = state {
            chain.push(current);
            state = current.parent.as_deref();
        }
        chain.into_iter().rev().flat_map(|s| s.file_keys.iter()).collect()
    }

    pub fn add_file_keys(&mut self, keys: impl IntoIterator<Item = FileKeys>) {
        self.file_keys.extend(keys);
    }

    // ========================================================================
    // Change bookkeeping
    // ========================================================================

    /// Id of the last change applied to this state or its parents.
    pub fn change_id(&self) -> Option<&ChangeId> {
        let mut state = self;
        loop {
            if let Some(id) = &state.change_id {
                return Some(id);
            }
            state = state.parent.as_deref()?;
        }
    }

    pub fn set_change_id(&mut self, id: ChangeId) {
        self.change_id = Some(id);
    }

    pub fn undo_history(&self) -> &UndoHistory {
        &self.undo
    }

    pub fn undo_history_mut(&mut self) -> &mut UndoHistory {
        &mut self.undo
    }
}
