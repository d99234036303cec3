//! Replaying a change tree into a document state.
//!
//! The tree root is the breakpoint snapshot. Its base seeds the state; every
//! other attached change is applied in canonical order, each in its own
//! derived state folded back with a fast apply. One full apply at the end
//! normalizes with layouts and refreshes derived details.

use std::sync::Arc;

use tracing::{debug, info};

use kiroku_history::{Change, Tree};
use kiroku_state::{ApplyMode, DocumentState};

use crate::config::NormalizeConfig;
use crate::{KernelError, Result};

#[derive(Clone, Debug, Default)]
pub struct StateReplayer {
    config: NormalizeConfig,
}

impl StateReplayer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self { config }
    }

    /// Replays the whole tree. Returns the state and the number of changes
    /// applied on top of the root snapshot.
    #[tracing::instrument(skip_all, name = "history.replay", fields(breakpoint = tracing::field::Empty, changes = tree.len()))]
    pub fn replay(&self, root_id: &str, tree: &Tree) -> Result<(DocumentState, usize)> {
        let root = tree.root().ok_or(KernelError::NoHistory)?;
        tracing::Span::current().record("breakpoint", tracing::field::display(&root.id));

        let (state, skip) = match &root.snapshot {
            Some(snapshot) => {
                let mut state = DocumentState::from_snapshot(root_id, &snapshot.base);
                state.set_change_id(root.id.clone());
                (state, 1)
            }
            None => (DocumentState::new(root_id), 0),
        };
        let changes: Vec<Arc<Change>> = tree
            .canonical_ids()
            .into_iter()
            .skip(skip)
            .filter_map(|id| tree.get(&id).cloned())
            .collect();
        let last = changes.last().unwrap_or(root).clone();
        let (state, applied) = self.apply_all(state, &changes)?;
        let state = self.finish(state, &last)?;
        info!(applied, blocks = state.len(), "replayed tree");
        Ok((state, applied))
    }

    /// Applies `changes` in order on top of an already replayed state.
    #[tracing::instrument(skip_all, name = "history.replay", fields(changes = changes.len(), incremental = true))]
    pub fn replay_changes(&self, state: DocumentState, changes: &[Arc<Change>]) -> Result<(DocumentState, usize)> {
        let Some(last) = changes.last() else {
            return Ok((state, 0));
        };
        let (state, applied) = self.apply_all(state, changes)?;
        let state = self.finish(state, last)?;
        Ok((state, applied))
    }

    fn apply_all(&self, mut state: DocumentState, changes: &[Arc<Change>]) -> Result<(DocumentState, usize)> {
        for change in changes {
            state = apply_one(state, change)?;
        }
        Ok((state, changes.len()))
    }

    /// Stamps last-modified from `last` and runs the full apply.
    fn finish(&self, state: DocumentState, last: &Change) -> Result<DocumentState> {
        let mut next = state.new_state();
        next.set_last_modified(last.timestamp, &last.author);
        let (state, _) = next.apply(ApplyMode::Full {
            with_layouts: self.config.with_layouts,
        })?;
        Ok(state)
    }
}

/// Folds one change into `state`. Failing ops are skipped inside
/// `apply_changes`; undecodable content aborts the replay.
fn apply_one(state: DocumentState, change: &Change) -> Result<DocumentState> {
    let ops = change.content()?;
    let mut next = state.new_state();
    let skipped = next.apply_changes(&ops);
    next.set_change_id(change.id.clone());
    next.add_file_keys(change.file_keys.iter().cloned());
    let (state, result) = next.apply(ApplyMode::Fast)?;
    debug!(
        change = %change.id,
        ops = ops.len(),
        skipped,
        events = result.events.len(),
        "change applied"
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiroku_history::{ChangeRecord, HistoryError, Snapshot};
    use kiroku_types::keys::{LAST_MODIFIED_BY, SNIPPET};
    use kiroku_types::{BaseSnapshot, Block, ChangeContent, ChangeId, Position, Value};

    fn snapshot(id: &str) -> Arc<Change> {
        let base = BaseSnapshot {
            blocks: vec![
                Block::new("doc", Default::default()).with_children(["t"]),
                Block::text("t", "hello"),
            ],
            ..Default::default()
        };
        let record = ChangeRecord::snapshot([], None, Snapshot { base, ..Default::default() });
        Arc::new(Change::from_record(id.into(), record))
    }

    fn change(id: &str, prev: &str, ops: &[ChangeContent]) -> Arc<Change> {
        let record = ChangeRecord::change([ChangeId::from(prev)], "s0".into())
            .with_content(ops)
            .unwrap()
            .with_author("ana", 1_700_000_000);
        Arc::new(Change::from_record(id.into(), record))
    }

    fn create(id: &str, text: &str) -> ChangeContent {
        ChangeContent::BlockCreate {
            target_id: "t".into(),
            position: Position::Bottom,
            blocks: vec![Block::text(id, text)],
        }
    }

    #[test]
    fn test_replay_applies_in_canonical_order() {
        let mut tree = Tree::new();
        tree.add([
            snapshot("s0"),
            change("c0", "s0", &[create("a", "first")]),
            change("c1", "c0", &[create("b", "second")]),
        ]);
        let (state, applied) = StateReplayer::default().replay("doc", &tree).unwrap();
        assert_eq!(applied, 2);
        assert_eq!(state.pick("doc").unwrap().children_ids, vec!["t", "b", "a"]);
        assert_eq!(state.change_id().map(ChangeId::as_str), Some("c1"));
        assert_eq!(state.detail(LAST_MODIFIED_BY), Some(&Value::from("ana")));
        assert_eq!(state.detail(SNIPPET), Some(&Value::from("hello\nsecond\nfirst")));
    }

    #[test]
    fn test_failed_ops_do_not_stop_replay() {
        let mut tree = Tree::new();
        tree.add([
            snapshot("s0"),
            change("c0", "s0", &[ChangeContent::BlockRemove { ids: vec!["t".into()] }]),
            change("c1", "c0", &[create("a", "orphaned"), create("b", "also")]),
            change(
                "c2",
                "c1",
                &[ChangeContent::DetailsSet {
                    key: "name".into(),
                    value: Value::from("doc"),
                }],
            ),
        ]);
        let (state, applied) = StateReplayer::default().replay("doc", &tree).unwrap();
        assert_eq!(applied, 3);
        assert!(state.pick("doc").unwrap().children_ids.is_empty());
        assert_eq!(state.detail("name"), Some(&Value::from("doc")));
    }

    #[test]
    fn test_corrupt_content_is_fatal() {
        let mut record = ChangeRecord::change([ChangeId::from("s0")], "s0".into());
        record.content = vec![0xff, 0xff, 0xff];
        let mut tree = Tree::new();
        tree.add([snapshot("s0"), Arc::new(Change::from_record("c0".into(), record))]);
        let err = StateReplayer::default().replay("doc", &tree).unwrap_err();
        assert!(matches!(err, KernelError::History(HistoryError::DecodeFailed { .. })));
    }

    #[test]
    fn test_empty_tree() {
        let err = StateReplayer::default().replay("doc", &Tree::new()).unwrap_err();
        assert!(err.is_empty_history());
    }

    #[test]
    fn test_incremental_matches_full_replay() {
        let s0 = snapshot("s0");
        let c0 = change("c0", "s0", &[create("a", "first")]);
        let c1 = change("c1", "c0", &[create("b", "second")]);

        let mut full = Tree::new();
        full.add([s0.clone(), c0.clone(), c1.clone()]);
        let (expected, _) = StateReplayer::default().replay("doc", &full).unwrap();

        let mut partial = Tree::new();
        partial.add([s0, c0]);
        let replayer = StateReplayer::default();
        let (state, _) = replayer.replay("doc", &partial).unwrap();
        let (state, applied) = replayer.replay_changes(state, &[c1]).unwrap();
        assert_eq!(applied, 1);
        assert_eq!(state.to_snapshot(), expected.to_snapshot());
    }
}
