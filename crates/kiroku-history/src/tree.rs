//! In-memory change DAG with incremental linking.
//!
//! The tree is an arena keyed by change id: `attached` and `unattached` are
//! the only owners of nodes, and edges are ids, never pointers. A change is
//! attached iff it is reachable from `root` along `next` edges.
//!
//! ```text
//!   root ──► c0 ──► c1 ──► c2          attached (reachable from root)
//!              └──► d0 ──┐
//!                        ▼
//!   x? ┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄► m              wait_list[x] = {m}, m attached via d0
//!   u0 ──► u1                          unattached (no attached parent yet)
//! ```
//!
//! [`Tree::add`] is the only write path. It is idempotent and
//! order-insensitive within a batch: any permutation of the same batch links
//! to the same attached set, heads, and digest.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;

use kiroku_types::ChangeId;

use crate::change::Change;

/// How a call to [`Tree::add`] moved the head set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// Nothing attached: duplicates, or changes still waiting for parents.
    Nothing,
    /// Every newly attached change descends from every former head; replaying
    /// just the new changes on top of the current state is equivalent to a
    /// full replay.
    Append,
    /// A side branch, late parent, or partial merge landed; replay from root.
    Rebuild,
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) change: Arc<Change>,
    /// Linked children, unique.
    pub(crate) next: Vec<ChangeId>,
}

impl Node {
    fn new(change: Arc<Change>) -> Self {
        Self {
            change,
            next: Vec::new(),
        }
    }

    fn link(&mut self, child: &ChangeId) {
        if !self.next.contains(child) {
            self.next.push(child.clone());
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Tree {
    root: Option<ChangeId>,
    pub(crate) attached: HashMap<ChangeId, Node>,
    unattached: HashMap<ChangeId, Node>,
    /// Missing parent id → children waiting for it.
    wait_list: HashMap<ChangeId, Vec<ChangeId>>,
    head_ids: Vec<ChangeId>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree with `root` installed and nothing else.
    pub fn with_root(root: Arc<Change>) -> Self {
        let mut tree = Self::new();
        tree.add([root]);
        tree
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn root(&self) -> Option<&Arc<Change>> {
        self.root
            .as_ref()
            .and_then(|id| self.attached.get(id))
            .map(|node| &node.change)
    }

    pub fn root_id(&self) -> Option<&ChangeId> {
        self.root.as_ref()
    }

    /// Sorted ids of attached changes without attached children.
    pub fn heads(&self) -> &[ChangeId] {
        &self.head_ids
    }

    /// Number of attached changes.
    pub fn len(&self) -> usize {
        self.attached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }

    pub fn unattached_len(&self) -> usize {
        self.unattached.len()
    }

    /// Attached change by id.
    pub fn get(&self, id: &str) -> Option<&Arc<Change>> {
        self.attached.get(id).map(|node| &node.change)
    }

    pub fn is_attached(&self, id: &str) -> bool {
        self.attached.contains_key(id)
    }

    pub fn is_unattached(&self, id: &str) -> bool {
        self.unattached.contains_key(id)
    }

    /// Whether the change is known at all, attached or not.
    pub fn contains(&self, id: &str) -> bool {
        self.is_attached(id) || self.is_unattached(id)
    }

    /// Attached children of `id`, in link order.
    pub fn next_of(&self, id: &str) -> &[ChangeId] {
        self.attached
            .get(id)
            .map(|node| node.next.as_slice())
            .unwrap_or(&[])
    }

    /// Parent ids that some known change is waiting for, sorted.
    pub fn missing_parents(&self) -> Vec<ChangeId> {
        let mut ids: Vec<ChangeId> = self.wait_list.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn unattached_ids(&self) -> Vec<ChangeId> {
        let mut ids: Vec<ChangeId> = self.unattached.keys().cloned().collect();
        ids.sort();
        ids
    }

    // =========================================================================
    // Linking
    // =========================================================================

    /// Link a batch of changes into the tree.
    ///
    /// On an empty tree the first change of the batch becomes root. Changes
    /// already known (attached or unattached) are ignored.
    pub fn add<I>(&mut self, changes: I) -> AddOutcome
    where
        I: IntoIterator<Item = Arc<Change>>,
    {
        let before_heads = self.head_ids.clone();
        let mut newly_attached = Vec::new();

        for change in changes {
            if self.contains(&change.id) {
                continue;
            }
            self.insert(change, &mut newly_attached);
        }

        if newly_attached.is_empty() {
            return AddOutcome::Nothing;
        }
        self.update_heads();
        self.classify(&before_heads, &newly_attached)
    }

    fn insert(&mut self, change: Arc<Change>, newly_attached: &mut Vec<ChangeId>) {
        let id = change.id.clone();

        if self.root.is_none() {
            self.root = Some(id.clone());
            self.attached.insert(id.clone(), Node::new(change));
            newly_attached.push(id.clone());
            self.attach_closure(&id, newly_attached);
            return;
        }

        let mut parents: Vec<&ChangeId> = change.previous_ids.iter().filter(|p| **p != id).collect();
        parents.sort();
        parents.dedup();

        let mut has_attached_parent = false;
        for parent_id in parents {
            if let Some(parent) = self.attached.get_mut(parent_id) {
                parent.link(&id);
                has_attached_parent = true;
            } else if let Some(parent) = self.unattached.get_mut(parent_id) {
                parent.link(&id);
            } else {
                let waiting = self.wait_list.entry(parent_id.clone()).or_default();
                if !waiting.contains(&id) {
                    waiting.push(id.clone());
                }
            }
        }

        let mut node = Node::new(change);
        if has_attached_parent {
            self.attached.insert(id.clone(), node);
            newly_attached.push(id.clone());
            self.attach_closure(&id, newly_attached);
        } else {
            // Children that were waiting for this change now hang off it and
            // will attach with it.
            if let Some(waiting) = self.wait_list.remove(&id) {
                for child in &waiting {
                    node.link(child);
                }
            }
            self.unattached.insert(id, node);
        }
    }

    /// Attach everything that becomes reachable once `start` is attached.
    fn attach_closure(&mut self, start: &ChangeId, newly_attached: &mut Vec<ChangeId>) {
        let mut stack = vec![start.clone()];
        while let Some(id) = stack.pop() {
            if let Some(waiting) = self.wait_list.remove(&id) {
                if let Some(node) = self.attached.get_mut(&id) {
                    for child in &waiting {
                        node.link(child);
                    }
                }
            }

            let next = match self.attached.get(&id) {
                Some(node) => node.next.clone(),
                None => continue,
            };
            for child in next {
                if let Some(node) = self.unattached.remove(&child) {
                    self.attached.insert(child.clone(), node);
                    newly_attached.push(child.clone());
                    stack.push(child);
                }
            }
        }
    }

    fn update_heads(&mut self) {
        let mut heads = Vec::new();
        if let Some(root) = &self.root {
            let mut visited: HashSet<&ChangeId> = HashSet::new();
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                if !visited.insert(id) {
                    continue;
                }
                let Some(node) = self.attached.get(id) else {
                    continue;
                };
                let mut has_child = false;
                for child in &node.next {
                    if self.attached.contains_key(child) {
                        has_child = true;
                        stack.push(child);
                    }
                }
                if !has_child {
                    heads.push(id.clone());
                }
            }
        }
        heads.sort();
        self.head_ids = heads;
    }

    fn classify(&self, before_heads: &[ChangeId], newly_attached: &[ChangeId]) -> AddOutcome {
        for head in before_heads {
            let descendants = self.descendants(head);
            if newly_attached.iter().any(|id| !descendants.contains(id)) {
                return AddOutcome::Rebuild;
            }
        }
        AddOutcome::Append
    }

    /// Strict descendants of `id` among attached changes.
    pub fn descendants(&self, id: &str) -> HashSet<ChangeId> {
        let mut out = HashSet::new();
        let mut queue: VecDeque<&ChangeId> = self.next_of(id).iter().collect();
        while let Some(child) = queue.pop_front() {
            if out.insert(child.clone()) {
                queue.extend(self.next_of(child).iter());
            }
        }
        out
    }

    /// Whether `ancestor` strictly precedes `id` in the attached DAG.
    pub fn is_ancestor(&self, ancestor: &str, id: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.attached.get(current) else {
                continue;
            };
            for parent in &node.change.previous_ids {
                if parent.as_str() == ancestor {
                    return true;
                }
                if visited.insert(parent.as_str()) {
                    stack.push(parent.as_str());
                }
            }
        }
        false
    }

    // =========================================================================
    // Digest and debug output
    // =========================================================================

    /// Digest of the canonical walk. Equal digests mean equal histories.
    pub fn hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        if let Some(root) = &self.root {
            for id in self.canonical_ids_from(root) {
                hasher.update(id.as_str().as_bytes());
                hasher.update(&[0]);
            }
        }
        hex::encode(hasher.finalize().as_bytes())
    }

    /// Graphviz rendering: snapshots boxed, unattached changes dashed.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph history {\n  rankdir=LR;\n");
        let mut nodes: Vec<(&ChangeId, &Node, bool)> = self
            .attached
            .iter()
            .map(|(id, node)| (id, node, true))
            .chain(self.unattached.iter().map(|(id, node)| (id, node, false)))
            .collect();
        nodes.sort_by(|a, b| a.0.cmp(b.0));

        for (id, node, attached) in &nodes {
            let shape = if node.change.is_snapshot() { "box" } else { "ellipse" };
            let style = if *attached { "solid" } else { "dashed" };
            let _ = writeln!(out, "  \"{id}\" [shape={shape}, style={style}];");
        }
        for (id, node, _) in &nodes {
            let mut parents = node.change.previous_ids.clone();
            parents.sort();
            for parent in parents {
                let _ = writeln!(out, "  \"{parent}\" -> \"{id}\";");
            }
        }
        out.push_str("}\n");
        out
    }
}
