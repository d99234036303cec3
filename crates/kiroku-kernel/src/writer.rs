//! Authoring changes.
//!
//! A pushed change names the current tree heads as its parents and the
//! governing snapshot as `last_snapshot_id`. Every so often it also carries a
//! full snapshot of the document so later builds can start from it.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{debug, info};

use kiroku_history::{
    ChangeCodec, ChangeRecord, PostcardCodec, RawRecord, RecordSink, Snapshot, Tree, content_address,
};
use kiroku_state::DocumentState;
use kiroku_types::{ChangeContent, ChangeId, FileKeys};

use crate::config::SnapshotConfig;
use crate::{KernelError, Result};

/// Width of the random draw behind [`snapshot_chance`].
const SNAPSHOT_DRAW: i64 = 2000;

#[derive(Clone, Debug, Default)]
pub struct PushOptions {
    pub author: String,
    /// Unix seconds; `0` means now.
    pub timestamp: i64,
    pub file_keys: Vec<FileKeys>,
    /// Attach a snapshot regardless of the policy.
    pub force_snapshot: bool,
}

/// Randomized snapshot policy: never while `changes` is at most
/// `min_changes`, then with a probability that grows by one slot every
/// `spread` changes.
pub fn snapshot_chance<R: Rng + ?Sized>(changes: usize, config: &SnapshotConfig, rng: &mut R) -> bool {
    if changes <= config.min_changes {
        return false;
    }
    let d = (changes / config.spread.max(1)) as i64 + 1;
    let mid = SNAPSHOT_DRAW / 2;
    let draw = rng.gen_range(0..SNAPSHOT_DRAW);
    (mid - d..=mid + d).contains(&draw)
}

/// The snapshot new changes hang off: the governing snapshot of the heads
/// that descends from all the others, or the tree root when the heads
/// disagree.
pub fn governing_snapshot(tree: &Tree) -> Option<ChangeId> {
    let root = tree.root_id()?.clone();
    let snapshots: Vec<ChangeId> = tree
        .heads()
        .iter()
        .filter_map(|head| tree.get(head)?.governing_snapshot().cloned())
        .collect();
    let newest = snapshots.iter().find(|candidate| {
        snapshots
            .iter()
            .all(|other| other == *candidate || tree.is_ancestor(other, candidate))
    });
    Some(newest.cloned().unwrap_or(root))
}

/// Changes attached after `snapshot`, not counting snapshots themselves.
fn changes_since(tree: &Tree, snapshot: &ChangeId) -> usize {
    let mut count = 0;
    tree.iterate(snapshot, |change| {
        if !change.is_snapshot() {
            count += 1;
        }
        true
    });
    count
}

pub struct ChangeWriter<'a> {
    sink: &'a dyn RecordSink,
    log_id: String,
    config: SnapshotConfig,
}

impl<'a> ChangeWriter<'a> {
    pub fn new(sink: &'a dyn RecordSink, log_id: impl Into<String>) -> Self {
        Self {
            sink,
            log_id: log_id.into(),
            config: SnapshotConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SnapshotConfig) -> Self {
        self.config = config;
        self
    }

    /// Writes `content` as a new change on this writer's log and returns its
    /// id. `state` is the document with `content` already applied; it is
    /// only read when the change carries a snapshot.
    pub async fn push_change(
        &self,
        tree: &Tree,
        state: &DocumentState,
        content: &[ChangeContent],
        opts: PushOptions,
    ) -> Result<ChangeId> {
        let heads = tree.heads().to_vec();
        let last_snapshot = governing_snapshot(tree);
        let with_snapshot = opts.force_snapshot
            || tree.len() <= 1
            || last_snapshot
                .as_ref()
                .is_some_and(|s| snapshot_chance(changes_since(tree, s), &self.config, &mut rand::thread_rng()));

        let mut record = if with_snapshot {
            let mut log_heads: BTreeMap<String, ChangeId> = BTreeMap::new();
            for log in self.sink.get_logs().await? {
                // Only heads this change descends from are covered by it.
                if tree.contains(&log.head) {
                    log_heads.insert(log.id, log.head);
                }
            }
            let snapshot = Snapshot {
                base: state.to_snapshot(),
                log_heads,
            };
            ChangeRecord::snapshot(heads.iter().cloned(), last_snapshot, snapshot)
        } else {
            let last = last_snapshot.ok_or(KernelError::NoHistory)?;
            ChangeRecord::change(heads.iter().cloned(), last)
        };
        record = record
            .with_content(content)?
            .with_file_keys(opts.file_keys)
            .with_author(
                opts.author,
                if opts.timestamp == 0 { kiroku_types::now_secs() } else { opts.timestamp },
            );

        let data = PostcardCodec.encode(&record)?;
        if data.len() > self.config.max_change_size {
            return Err(KernelError::ChangeTooBig {
                size: data.len(),
                limit: self.config.max_change_size,
            });
        }
        let id = content_address(&data);
        debug!(change = %id, bytes = data.len(), ops = content.len(), snapshot = with_snapshot, "encoded change");

        self.sink.put_record(RawRecord { id: id.clone(), data }).await?;
        self.sink.set_log_head(&self.log_id, &id).await?;
        info!(change = %id, log = %self.log_id, parents = heads.len(), snapshot = with_snapshot, "pushed change");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_no_snapshot_below_minimum() {
        let config = SnapshotConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        assert!((0..1000).all(|_| !snapshot_chance(100, &config, &mut rng)));
    }

    #[test]
    fn test_snapshot_certain_for_huge_gaps() {
        let config = SnapshotConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        // d = 2001 covers the whole draw.
        assert!((0..1000).all(|_| snapshot_chance(100_000, &config, &mut rng)));
    }

    #[test]
    fn test_snapshot_rate_grows_with_gap() {
        let config = SnapshotConfig::default();
        let mut rng = StdRng::seed_from_u64(42);
        let mut hits = |changes| (0..20_000).filter(|_| snapshot_chance(changes, &config, &mut rng)).count();
        let near = hits(101);
        let far = hits(5_000);
        // 7 of 2000 slots vs 203 of 2000 slots.
        assert!(near < 200, "near = {near}");
        assert!(far > 1_500, "far = {far}");
    }
}
