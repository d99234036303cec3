//! Canonical walk over the attached DAG.
//!
//! Depth-first, pre-order, children explored in descending id order. A merge
//! change is entered only once all of its parents inside the walk have been
//! emitted, so every change follows all of its ancestors. On a DAG without
//! merges this is exactly the plain pre-order DFS. The order depends only on
//! the set of attached ids, which makes it reproducible on any device.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kiroku_types::ChangeId;

use crate::change::Change;
use crate::tree::Tree;

impl Tree {
    /// Visit attached changes reachable from `start_id` in canonical order,
    /// stopping early when `visit` returns `false`.
    pub fn iterate<F>(&self, start_id: &str, mut visit: F)
    where
        F: FnMut(&Arc<Change>) -> bool,
    {
        for id in self.canonical_ids_from(start_id) {
            if let Some(change) = self.get(&id) {
                if !visit(change) {
                    return;
                }
            }
        }
    }

    /// Canonical order of the whole tree, starting at root.
    pub fn canonical_ids(&self) -> Vec<ChangeId> {
        match self.root_id() {
            Some(root) => self.canonical_ids_from(root),
            None => Vec::new(),
        }
    }

    /// Canonical order of the sub-DAG reachable from `start_id`.
    pub fn canonical_ids_from(&self, start_id: &str) -> Vec<ChangeId> {
        let Some((start, _)) = self.attached.get_key_value(start_id) else {
            return Vec::new();
        };

        // In-degree counted over edges inside the walk scope only.
        let scope = self.reachable_from(start);
        let mut pending: HashMap<&ChangeId, usize> = scope.iter().map(|id| (*id, 0)).collect();
        for id in &scope {
            for child in self.scoped_children(id, &scope) {
                if let Some(count) = pending.get_mut(child) {
                    *count += 1;
                }
            }
        }

        let mut order = Vec::with_capacity(scope.len());
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            order.push(id.clone());

            let mut ready = Vec::new();
            for child in self.scoped_children(id, &scope) {
                if let Some(count) = pending.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(child);
                    }
                }
            }
            // Ascending push, so the largest id is popped first.
            ready.sort();
            stack.extend(ready);
        }
        order
    }

    fn reachable_from<'t>(&'t self, start: &'t ChangeId) -> HashSet<&'t ChangeId> {
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.attached.get(id) {
                stack.extend(node.next.iter().filter(|c| self.attached.contains_key(*c)));
            }
        }
        seen
    }

    fn scoped_children<'t>(
        &'t self,
        id: &ChangeId,
        scope: &'t HashSet<&'t ChangeId>,
    ) -> impl Iterator<Item = &'t ChangeId> + 't {
        self.attached
            .get(id)
            .into_iter()
            .flat_map(|node| node.next.iter())
            .filter(move |child| scope.contains(child))
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::tests::{change, snap};
    use crate::tree::Tree;
    use kiroku_types::ChangeId;

    fn order(tree: &Tree) -> Vec<String> {
        tree.canonical_ids().into_iter().map(String::from).collect()
    }

    #[test]
    fn test_children_descending() {
        let mut tree = Tree::with_root(snap("s0", &[], None));
        tree.add([
            change("a", &["s0"], "s0"),
            change("b", &["s0"], "s0"),
            change("a1", &["a"], "s0"),
            change("c", &["s0"], "s0"),
        ]);
        assert_eq!(order(&tree), vec!["s0", "c", "b", "a", "a1"]);
    }

    #[test]
    fn test_merge_after_all_parents() {
        let mut tree = Tree::with_root(snap("s0", &[], None));
        tree.add([
            change("a", &["s0"], "s0"),
            change("b", &["s0"], "s0"),
            change("m", &["a", "b"], "s0"),
            change("n", &["m"], "s0"),
        ]);
        // Plain pre-order would emit m right after b.
        assert_eq!(order(&tree), vec!["s0", "b", "a", "m", "n"]);
    }

    #[test]
    fn test_iterate_from_inner_start_and_stop() {
        let mut tree = Tree::with_root(snap("s0", &[], None));
        tree.add([
            change("a", &["s0"], "s0"),
            change("b", &["a"], "s0"),
            change("c", &["b"], "s0"),
        ]);
        let mut seen = Vec::new();
        tree.iterate("a", |c| {
            seen.push(c.id.clone());
            c.id != "b"
        });
        assert_eq!(seen, vec![ChangeId::from("a"), ChangeId::from("b")]);
    }

    #[test]
    fn test_iterate_unknown_start_is_empty() {
        let tree = Tree::with_root(snap("s0", &[], None));
        let mut count = 0;
        tree.iterate("zzz", |_| {
            count += 1;
            true
        });
        assert_eq!(count, 0);
    }

    #[test]
    fn test_merge_with_out_of_scope_parent() {
        let mut tree = Tree::with_root(snap("s0", &[], None));
        tree.add([
            change("a", &["s0"], "s0"),
            change("b", &["s0"], "s0"),
            change("m", &["a", "b"], "s0"),
        ]);
        // b is not reachable from a, so m only waits for a.
        let ids: Vec<String> = tree.canonical_ids_from("a").into_iter().map(String::from).collect();
        assert_eq!(ids, vec!["a", "m"]);
    }

    #[test]
    fn test_hash_depends_on_walk() {
        let mut left = Tree::with_root(snap("s0", &[], None));
        left.add([change("a", &["s0"], "s0"), change("b", &["a"], "s0")]);
        let mut right = Tree::with_root(snap("s0", &[], None));
        right.add([change("b", &["a"], "s0"), change("a", &["s0"], "s0")]);
        assert_eq!(left.hash(), right.hash());

        right.add([change("c", &["s0"], "s0")]);
        assert_ne!(left.hash(), right.hash());
    }
}
