//! Block tree normalizer.
//!
//! Runs before every apply and restores the tree invariants:
//!
//! - every child id names an existing block, at most once, under one parent,
//!   and the child graph is acyclic (first claim in pre-order wins, the root
//!   claims its own children first);
//! - empty row/column/div wrappers are removed, single-column rows collapse,
//!   and columns of a row whose size changed lose their `width`;
//! - with layouts: oversized children lists are split into balanced `Div`
//!   wrappers and the `header` block is hoisted to the front of the root;
//! - per-kind fixes (text marks, duplicate dataview views) and oversized
//!   string details.
//!
//! Blocks are only copied into the overlay when something actually changes,
//! so normalizing an already normal state is a no-op.

use std::collections::HashSet;

use kiroku_types::keys::HEADER_BLOCK_ID;
use kiroku_types::{Block, BlockContent, LayoutStyle, Value, WIDTH_FIELD};
use tracing::debug;

use crate::insert::derived_id;
use crate::{DocumentState, StateError};

/// Largest children list a block keeps before it is split into `Div`s.
pub const MAX_CHILDREN: usize = 40;

/// String details longer than this many bytes are shortened.
pub const DETAIL_VALUE_LIMIT: usize = 64 * 1024;

impl DocumentState {
    /// Normalizes the visible tree. `with_layouts` also rebalances large
    /// branches into `Div`s and hoists the header.
    pub fn normalize(&mut self, with_layouts: bool) -> Result<(), StateError> {
        if !self.exists(&self.root_id) {
            if self.known_ids().is_empty() {
                return Ok(());
            }
            return Err(StateError::NormalizationFailed(format!(
                "root block {} is missing",
                self.root_id
            )));
        }
        self.normalize_children();
        if with_layouts {
            self.hoist_header();
        }
        self.normalize_layouts();
        self.reset_row_widths();
        if with_layouts {
            self.rebalance_divs();
        }
        self.normalize_blocks();
        self.normalize_details();
        Ok(())
    }

    /// Reachable ids in pre-order.
    pub(crate) fn tree_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.iterate(|block| {
            ids.push(block.id.clone());
            true
        });
        ids
    }

    /// Writes a children list only when it differs.
    pub(crate) fn set_children(&mut self, id: &str, children: Vec<String>) -> bool {
        if self.pick(id).is_none_or(|b| b.children_ids == children) {
            return false;
        }
        match self.get_mut(id) {
            Some(block) => {
                block.children_ids = children;
                true
            }
            None => false,
        }
    }

    fn children_of(&self, id: &str) -> Vec<String> {
        self.pick(id).map(|b| b.children_ids.clone()).unwrap_or_default()
    }

    /// Drops dangling, duplicate, and cyclic child references.
    fn normalize_children(&mut self) {
        let mut claimed: HashSet<String> = HashSet::from([self.root_id.clone()]);
        let mut stack = vec![self.root_id.clone()];
        while let Some(id) = stack.pop() {
            let children = self.children_of(&id);
            let kept: Vec<String> = children
                .iter()
                .filter(|child| self.exists(child) && claimed.insert((*child).clone()))
                .cloned()
                .collect();
            if kept.len() != children.len() {
                debug!(block = %id, dropped = children.len() - kept.len(), "dropped child references");
            }
            stack.extend(kept.iter().rev().cloned());
            self.set_children(&id, kept);
        }
    }

    /// Removes empty wrappers and collapses single-child rows until stable.
    fn normalize_layouts(&mut self) {
        loop {
            let mut changed = false;
            for id in self.tree_ids() {
                let children = self.children_of(&id);
                let mut next = Vec::with_capacity(children.len());
                for child_id in &children {
                    let Some(child) = self.pick(child_id) else { continue };
                    match child.layout_style() {
                        Some(style) if !style.survives_empty() && child.children_ids.is_empty() => {}
                        Some(LayoutStyle::Row) if child.children_ids.len() == 1 => {
                            let only = &child.children_ids[0];
                            match self.pick(only) {
                                Some(column) if column.is_layout(LayoutStyle::Column) => {
                                    next.extend(column.children_ids.iter().cloned());
                                }
                                _ => next.push(only.clone()),
                            }
                        }
                        _ => next.push(child_id.clone()),
                    }
                }
                changed |= self.set_children(&id, next);
            }
            if !changed {
                break;
            }
        }
    }

    /// Columns of a row whose column count changed get their width reset.
    fn reset_row_widths(&mut self) {
        for id in self.tree_ids() {
            let Some(row) = self.pick(&id).filter(|b| b.is_layout(LayoutStyle::Row)) else {
                continue;
            };
            let Some(origin) = self.pick_origin(&id) else { continue };
            if origin.children_ids.len() == row.children_ids.len() {
                continue;
            }
            let columns = row.children_ids.clone();
            for column_id in columns {
                let has_width = self
                    .pick(&column_id)
                    .and_then(|c| c.fields.get(WIDTH_FIELD))
                    .and_then(Value::as_f64)
                    .is_some_and(|w| w != 0.0);
                if !has_width {
                    continue;
                }
                if let Some(column) = self.get_mut(&column_id) {
                    column.fields.insert(WIDTH_FIELD.to_string(), Value::from(0.0));
                }
            }
        }
    }

    /// Children of `id` with nested `Div` wrappers expanded.
    fn flatten_divs(&self, children: &[String], out: &mut Vec<String>) {
        for child_id in children {
            match self.pick(child_id) {
                Some(child) if child.is_div_wrapper() => self.flatten_divs(&child.children_ids, out),
                _ => out.push(child_id.clone()),
            }
        }
    }

    /// True when `id` or any `Div` below it holds too many children.
    fn needs_rebalance(&self, id: &str, limit: usize) -> bool {
        let Some(block) = self.pick(id) else { return false };
        if block.children_ids.len() > limit {
            return true;
        }
        block.children_ids.iter().any(|child| {
            self.pick(child)
                .is_some_and(|c| c.is_div_wrapper() && self.needs_rebalance(child, MAX_CHILDREN))
        })
    }

    fn rebalance_divs(&mut self) {
        for id in self.tree_ids() {
            if self.pick(&id).is_none_or(Block::is_div_wrapper) {
                continue;
            }
            let mut children = self.children_of(&id);
            let keep_header = id == self.root_id && children.first().is_some_and(|c| c == HEADER_BLOCK_ID);
            let limit = if keep_header { MAX_CHILDREN - 1 } else { MAX_CHILDREN };
            if !self.needs_rebalance(&id, MAX_CHILDREN) {
                continue;
            }
            if keep_header {
                children.remove(0);
            }
            let mut level = Vec::with_capacity(children.len());
            self.flatten_divs(&children, &mut level);
            while level.len() > limit {
                let groups = level.len().div_ceil(MAX_CHILDREN);
                let size = level.len().div_ceil(groups);
                let mut wrapped = Vec::with_capacity(groups);
                for chunk in level.chunks(size) {
                    let div_id = format!("div-{}", derived_id(&[id.as_str(), chunk[0].as_str()]));
                    self.set(Block::layout(div_id.clone(), LayoutStyle::Div).with_children(chunk.iter().cloned()));
                    wrapped.push(div_id);
                }
                level = wrapped;
            }
            if keep_header {
                level.insert(0, HEADER_BLOCK_ID.to_string());
            }
            debug!(block = %id, children = level.len(), "rebalanced into divs");
            self.set_children(&id, level);
        }
    }

    fn hoist_header(&mut self) {
        let root_id = self.root_id.clone();
        if !self.tree_ids().iter().any(|id| id == HEADER_BLOCK_ID) {
            return;
        }
        let root_children = self.children_of(&root_id);
        if root_children.first().is_some_and(|c| c == HEADER_BLOCK_ID) {
            return;
        }
        self.unlink(HEADER_BLOCK_ID);
        let mut children = self.children_of(&root_id);
        children.insert(0, HEADER_BLOCK_ID.to_string());
        self.set_children(&root_id, children);
    }

    /// Per-kind fixes that keep block content self-consistent.
    fn normalize_blocks(&mut self) {
        for id in self.tree_ids() {
            let Some(block) = self.pick(&id) else { continue };
            let fixed = match &block.content {
                BlockContent::Text(text) => {
                    let len = text.text.chars().count() as u32;
                    let marks: Vec<_> = text
                        .marks
                        .iter()
                        .filter(|m| m.from < len.min(m.to))
                        .map(|m| {
                            let mut mark = m.clone();
                            mark.to = m.to.min(len);
                            mark
                        })
                        .collect();
                    (marks != text.marks).then(|| {
                        let mut text = text.clone();
                        text.marks = marks;
                        BlockContent::Text(text)
                    })
                }
                BlockContent::Dataview(dataview) => {
                    let mut seen = HashSet::new();
                    let views: Vec<_> = dataview.views.iter().filter(|v| seen.insert(v.id.as_str())).cloned().collect();
                    (views.len() != dataview.views.len()).then(|| {
                        let mut dataview = dataview.clone();
                        dataview.views = views;
                        BlockContent::Dataview(dataview)
                    })
                }
                _ => None,
            };
            let Some(content) = fixed else { continue };
            if let Some(block) = self.get_mut(&id) {
                block.content = content;
            }
        }
    }

    fn normalize_details(&mut self) {
        let oversized: Vec<String> = self
            .details()
            .iter()
            .filter(|(_, v)| v.as_str().is_some_and(|s| s.len() > DETAIL_VALUE_LIMIT))
            .map(|(k, _)| k.clone())
            .collect();
        for key in oversized {
            let Some(Value::String(value)) = self.details().get(&key).cloned() else { continue };
            debug!(key = %key, len = value.len(), "shortening detail value");
            self.set_detail(key, Value::String(truncate_str(&value, DETAIL_VALUE_LIMIT).to_string()));
        }
    }
}

/// Longest prefix of at most `max` bytes ending on a char boundary.
pub(crate) fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
