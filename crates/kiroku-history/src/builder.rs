//! Build passes: resolve, load, link.
//!
//! A pass owns one [`ChangeLoader`] and one fresh [`Tree`]. Nothing from a
//! failed or canceled pass escapes it.
//!
//! Corrupt records are handled by restarting: when the walk below a head hits
//! a record that does not decode, that head is dropped and the pass starts
//! over with the remaining heads. The loader cache survives restarts, so the
//! extra cost is the re-link, never a re-fetch. The result is the same tree
//! the pass would have built if the corrupt log had never existed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use kiroku_types::ChangeId;

use crate::change::Change;
use crate::codec::{ChangeCodec, PostcardCodec};
use crate::config::HistoryConfig;
use crate::loader::ChangeLoader;
use crate::report::{BuildReport, BuildWarning};
use crate::resolver::resolve_breakpoint;
use crate::store::RecordStore;
use crate::tree::{AddOutcome, Tree};
use crate::{HistoryError, Result};

/// Result of a build pass.
#[derive(Debug)]
pub struct BuiltTree {
    pub tree: Tree,
    /// Log heads the pass was built from, corrupt ones removed, sorted.
    pub heads: Vec<ChangeId>,
    pub outcome: AddOutcome,
    pub report: BuildReport,
}

impl BuiltTree {
    pub fn breakpoint(&self) -> Option<&ChangeId> {
        self.tree.root_id()
    }
}

pub struct DagBuilder<'a> {
    store: &'a dyn RecordStore,
    codec: &'a dyn ChangeCodec,
    config: HistoryConfig,
    cancel: CancellationToken,
}

impl<'a> DagBuilder<'a> {
    pub fn new(store: &'a dyn RecordStore, codec: &'a dyn ChangeCodec) -> Self {
        Self {
            store,
            codec,
            config: HistoryConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: HistoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Cancel this token to abort the pass at its next load.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Full tree from the current log heads.
    #[tracing::instrument(skip_all, name = "history.build")]
    pub async fn build_tree(&self) -> Result<BuiltTree> {
        let logs = self.store.get_logs().await?;
        if logs.is_empty() {
            return Err(HistoryError::EmptyHistory);
        }
        let heads: Vec<ChangeId> = logs.into_iter().map(|log| log.head).collect();
        let mut loader = self.loader();
        self.build_from_heads(&mut loader, heads).await
    }

    /// Tree of everything up to `id`; `inclusive = false` stops at its parents.
    #[tracing::instrument(skip_all, name = "history.build", fields(before = %id, inclusive = inclusive))]
    pub async fn build_tree_before(&self, id: &ChangeId, inclusive: bool) -> Result<BuiltTree> {
        let mut loader = self.loader();
        let heads = if inclusive {
            vec![id.clone()]
        } else {
            loader.load(id).await?.previous_ids.clone()
        };
        if heads.is_empty() {
            return Err(HistoryError::EmptyHistory);
        }
        self.build_from_heads(&mut loader, heads).await
    }

    /// The sub-DAG of details-meta changes, re-linked through the changes
    /// that were projected away.
    #[tracing::instrument(skip_all, name = "history.build", fields(details = true))]
    pub async fn build_details_tree(&self) -> Result<BuiltTree> {
        let full = self.build_tree().await?;
        let tree = project_details(&full.tree);
        tracing::debug!(
            full = full.tree.len(),
            details = tree.len(),
            "projected details tree"
        );
        Ok(BuiltTree {
            outcome: if tree.is_empty() { AddOutcome::Nothing } else { AddOutcome::Append },
            tree,
            heads: full.heads,
            report: full.report,
        })
    }

    fn loader(&self) -> ChangeLoader<'a> {
        ChangeLoader::new(self.store, self.codec, self.cancel.clone())
    }

    async fn build_from_heads(&self, loader: &mut ChangeLoader<'_>, mut heads: Vec<ChangeId>) -> Result<BuiltTree> {
        heads.sort();
        heads.dedup();
        let mut report = BuildReport::default();

        loop {
            let resolution = resolve_breakpoint(loader, &heads, &self.config, &mut report).await?;
            heads.retain(|head| !resolution.invalid.contains(head));

            let breakpoint = loader.load(&resolution.breakpoint).await?;
            let older = self.older_snapshots(loader, &breakpoint).await?;

            let mut buffer: Vec<Arc<Change>> = vec![breakpoint.clone()];
            let mut seen: HashSet<ChangeId> = HashSet::from([breakpoint.id.clone()]);
            let mut failed = None;
            for head in &resolution.heads {
                match collect_closure(loader, head, &older, &mut seen, &mut buffer).await {
                    Ok(()) => {}
                    Err(err) if err.is_decode_failed() => {
                        failed = Some((head.clone(), err));
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }

            if let Some((head, err)) = failed {
                tracing::warn!(head = %head, error = %err, "dropping log with undecodable history, restarting pass");
                report.warn(BuildWarning::DroppedLog {
                    head: head.clone(),
                    reason: err.to_string(),
                });
                heads.retain(|h| *h != head);
                report.subsumed_heads.clear();
                continue;
            }

            let mut tree = Tree::new();
            let outcome = tree.add(buffer);
            let unattached = tree.unattached_ids();
            if !unattached.is_empty() {
                tracing::warn!(count = unattached.len(), "changes left unattached below the breakpoint");
                report.warn(BuildWarning::Unattached { ids: unattached });
            }
            report.breakpoint = Some(breakpoint.id.clone());
            report.fetches = loader.fetches();

            tracing::info!(
                breakpoint = %breakpoint.id,
                heads = tree.heads().len(),
                changes = tree.len(),
                fetches = report.fetches,
                "built tree"
            );
            return Ok(BuiltTree {
                tree,
                heads,
                outcome,
                report,
            });
        }
    }

    /// Snapshot ids strictly before `breakpoint` on its snapshot chain.
    async fn older_snapshots(&self, loader: &mut ChangeLoader<'_>, breakpoint: &Change) -> Result<HashSet<ChangeId>> {
        let mut older = HashSet::new();
        let mut next = breakpoint.last_snapshot_id.clone().filter(|id| !id.is_empty());
        while let Some(id) = next {
            if older.len() >= self.config.max_snapshot_chain {
                return Err(HistoryError::SnapshotChainTooLong(breakpoint.id.clone()));
            }
            next = match loader.load(&id).await {
                Ok(change) => change.last_snapshot_id.clone().filter(|id| !id.is_empty()),
                // A broken chain below the breakpoint only limits pruning.
                Err(err) if err.is_decode_failed() => None,
                Err(err) => return Err(err),
            };
            older.insert(id);
        }
        Ok(older)
    }
}

enum Visit {
    Enter(ChangeId),
    Exit(Arc<Change>),
}

/// Post-order walk from `head` along `previous_ids`, appending every change
/// not yet seen. Stops at the breakpoint (pre-seeded in `seen`) and at
/// changes governed by a snapshot older than the breakpoint.
async fn collect_closure(
    loader: &mut ChangeLoader<'_>,
    head: &ChangeId,
    older: &HashSet<ChangeId>,
    seen: &mut HashSet<ChangeId>,
    buffer: &mut Vec<Arc<Change>>,
) -> Result<()> {
    let mut stack = vec![Visit::Enter(head.clone())];
    while let Some(visit) = stack.pop() {
        let id = match visit {
            Visit::Exit(change) => {
                buffer.push(change);
                continue;
            }
            Visit::Enter(id) => id,
        };
        if seen.contains(&id) {
            continue;
        }
        let change = loader.load(&id).await?;
        seen.insert(id);
        if predates(&change, older) {
            continue;
        }
        stack.push(Visit::Exit(change.clone()));
        for parent in change.previous_ids.iter().rev() {
            if !seen.contains(parent) {
                stack.push(Visit::Enter(parent.clone()));
            }
        }
    }
    Ok(())
}

fn predates(change: &Change, older: &HashSet<ChangeId>) -> bool {
    if change.is_snapshot() {
        older.contains(&change.id)
    } else {
        change
            .last_snapshot_id
            .as_ref()
            .is_some_and(|last| older.contains(last))
    }
}

/// Keep only details-meta changes (and the root), re-parenting each kept
/// change onto the nearest kept ancestors along every path.
pub fn project_details(tree: &Tree) -> Tree {
    let mut frontier: HashMap<ChangeId, Vec<ChangeId>> = HashMap::new();
    let mut kept: Vec<Arc<Change>> = Vec::new();
    let root_id = tree.root_id().cloned();

    for id in tree.canonical_ids() {
        let Some(change) = tree.get(&id) else {
            continue;
        };
        let mut parents_frontier: Vec<ChangeId> = change
            .previous_ids
            .iter()
            .filter_map(|parent| frontier.get(parent))
            .flatten()
            .cloned()
            .collect();
        parents_frontier.sort();
        parents_frontier.dedup();

        let is_root = root_id.as_ref() == Some(&id);
        if is_root || change.is_details_meta() {
            let projected = if is_root {
                change.clone()
            } else {
                Arc::new(change.with_previous_ids(parents_frontier))
            };
            kept.push(projected);
            frontier.insert(id.clone(), vec![id]);
        } else {
            frontier.insert(id, parents_frontier);
        }
    }

    let mut projected = Tree::new();
    projected.add(kept);
    projected
}

/// [`DagBuilder::build_tree`] with the postcard codec and default config.
pub async fn build_tree(store: &dyn RecordStore) -> Result<BuiltTree> {
    DagBuilder::new(store, &PostcardCodec).build_tree().await
}

/// [`DagBuilder::build_tree_before`] with the postcard codec and default config.
pub async fn build_tree_before(store: &dyn RecordStore, id: &ChangeId, inclusive: bool) -> Result<BuiltTree> {
    DagBuilder::new(store, &PostcardCodec)
        .build_tree_before(id, inclusive)
        .await
}

/// [`DagBuilder::build_details_tree`] with the postcard codec and default config.
pub async fn build_details_tree(store: &dyn RecordStore) -> Result<BuiltTree> {
    DagBuilder::new(store, &PostcardCodec).build_details_tree().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{ChangeRecord, Snapshot};
    use crate::store::MemoryRecordStore;
    use kiroku_types::{ChangeContent, Value};

    fn put_snapshot(store: &MemoryRecordStore, id: &str, prev: &[&str], last: Option<&str>) {
        let record = ChangeRecord::snapshot(
            prev.iter().map(|p| ChangeId::from(*p)),
            last.map(ChangeId::from),
            Snapshot::default(),
        );
        store.insert_record(id, &record).unwrap();
    }

    fn put_change(store: &MemoryRecordStore, id: &str, prev: &[&str], last: &str, ops: &[ChangeContent]) {
        let record = ChangeRecord::change(prev.iter().map(|p| ChangeId::from(*p)), last.into())
            .with_content(ops)
            .unwrap();
        store.insert_record(id, &record).unwrap();
    }

    fn details_set(key: &str) -> ChangeContent {
        ChangeContent::DetailsSet {
            key: key.into(),
            value: Value::from(true),
        }
    }

    fn ids(tree: &Tree) -> Vec<String> {
        tree.canonical_ids().into_iter().map(String::from).collect()
    }

    #[tokio::test]
    async fn test_no_logs_is_empty_history() {
        let store = MemoryRecordStore::new();
        assert_eq!(build_tree(&store).await.unwrap_err(), HistoryError::EmptyHistory);
    }

    #[tokio::test]
    async fn test_missing_record_is_fatal() {
        let store = MemoryRecordStore::new();
        put_snapshot(&store, "s0", &[], None);
        put_change(&store, "c1", &["c0"], "s0", &[]);
        store.set_head("a", "c1");
        assert_eq!(
            build_tree(&store).await.unwrap_err(),
            HistoryError::RecordNotFound("c0".into())
        );
    }

    #[tokio::test]
    async fn test_corrupt_ancestor_drops_whole_log() {
        let store = MemoryRecordStore::new();
        put_snapshot(&store, "s0", &[], None);
        put_change(&store, "c0", &["s0"], "s0", &[]);
        store.insert_raw("x1", vec![0xff, 0xff, 0xff]);
        put_change(&store, "x2", &["x1"], "s0", &[]);
        store.set_head("a", "c0");
        store.set_head("b", "x2");

        let built = build_tree(&store).await.unwrap();
        assert_eq!(ids(&built.tree), vec!["s0", "c0"]);
        assert_eq!(built.heads, vec![ChangeId::from("c0")]);
        assert_eq!(built.report.dropped_heads(), vec![&ChangeId::from("x2")]);
    }

    #[tokio::test]
    async fn test_walk_stops_at_older_snapshots() {
        let store = MemoryRecordStore::new();
        put_snapshot(&store, "s0", &[], None);
        put_change(&store, "x", &["s0"], "s0", &[]);
        put_change(&store, "y", &["s0"], "s0", &[]);
        put_snapshot(&store, "s1", &["x"], Some("s0"));
        put_change(&store, "m", &["s1", "y"], "s1", &[]);
        store.set_head("a", "m");

        let built = build_tree(&store).await.unwrap();
        assert_eq!(built.breakpoint().unwrap(), "s1");
        assert_eq!(ids(&built.tree), vec!["s1", "m"]);
        assert!(!built.tree.contains("y"));
    }

    #[tokio::test]
    async fn test_build_tree_before() {
        let store = MemoryRecordStore::new();
        put_snapshot(&store, "s0", &[], None);
        put_change(&store, "c0", &["s0"], "s0", &[]);
        put_change(&store, "c1", &["c0"], "s0", &[]);
        put_change(&store, "c2", &["c1"], "s0", &[]);
        store.set_head("a", "c2");

        let inclusive = build_tree_before(&store, &"c1".into(), true).await.unwrap();
        assert_eq!(ids(&inclusive.tree), vec!["s0", "c0", "c1"]);

        let exclusive = build_tree_before(&store, &"c1".into(), false).await.unwrap();
        assert_eq!(ids(&exclusive.tree), vec!["s0", "c0"]);

        let root = build_tree_before(&store, &"s0".into(), false).await.unwrap_err();
        assert_eq!(root, HistoryError::EmptyHistory);
    }

    #[tokio::test]
    async fn test_details_tree_relinks_through_skipped_changes() {
        let store = MemoryRecordStore::new();
        put_snapshot(&store, "s0", &[], None);
        put_change(&store, "c0", &["s0"], "s0", &[]);
        put_change(&store, "d1", &["c0"], "s0", &[details_set("name")]);
        put_change(&store, "c2", &["d1"], "s0", &[]);
        put_change(&store, "e1", &["c0"], "s0", &[]);
        put_change(&store, "d2", &["c2", "e1"], "s0", &[details_set("done")]);
        store.set_head("a", "d2");

        let built = build_details_tree(&store).await.unwrap();
        assert_eq!(ids(&built.tree), vec!["s0", "d1", "d2"]);
        assert_eq!(built.tree.heads(), &[ChangeId::from("d2")]);
        let d2 = built.tree.get("d2").unwrap();
        assert_eq!(d2.previous_ids, vec![ChangeId::from("d1"), ChangeId::from("s0")]);
    }

    #[tokio::test]
    async fn test_canceled_pass() {
        let store = MemoryRecordStore::new();
        put_snapshot(&store, "s0", &[], None);
        store.set_head("a", "s0");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = DagBuilder::new(&store, &PostcardCodec)
            .with_cancel(cancel)
            .build_tree()
            .await
            .unwrap_err();
        assert_eq!(err, HistoryError::Canceled);
    }
}
