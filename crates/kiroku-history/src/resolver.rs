//! Breakpoint resolution.
//!
//! Collapses the fan of current heads into the single snapshot every head
//! descends from:
//!
//! 1. each head contributes its governing snapshot (one `last_snapshot_id`
//!    step at most);
//! 2. heads recorded verbatim in some governing snapshot's `log_heads` are
//!    subsumed by that snapshot and dropped with their contribution;
//! 3. the remaining snapshots are folded pairwise with [`common_snapshot`].
//!
//! A head whose record (or governing snapshot) fails to decode is dropped
//! from the pass, as if its log were empty.

use std::collections::HashSet;

use kiroku_types::ChangeId;

use crate::config::HistoryConfig;
use crate::loader::ChangeLoader;
use crate::report::{BuildReport, BuildWarning};
use crate::{HistoryError, Result};

/// Outcome of resolving one head set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub breakpoint: ChangeId,
    /// Heads that survived pruning, in input order.
    pub heads: Vec<ChangeId>,
    /// Heads dropped because their records failed to decode.
    pub invalid: Vec<ChangeId>,
}

/// Resolve the breakpoint snapshot for `heads`.
pub async fn resolve_breakpoint(
    loader: &mut ChangeLoader<'_>,
    heads: &[ChangeId],
    config: &HistoryConfig,
    report: &mut BuildReport,
) -> Result<Resolution> {
    // 1. governing snapshots
    let mut governed: Vec<(ChangeId, ChangeId)> = Vec::new();
    let mut invalid = Vec::new();
    let mut seen_heads = HashSet::new();
    for head in heads {
        if !seen_heads.insert(head.clone()) {
            continue;
        }
        match governing_snapshot(loader, head).await {
            Ok(Some(snapshot)) => governed.push((head.clone(), snapshot)),
            Ok(None) => {
                tracing::warn!(head = %head, "head has no snapshot lineage, ignoring");
            }
            Err(err) if err.is_decode_failed() => {
                report.warn(BuildWarning::DroppedLog {
                    head: head.clone(),
                    reason: err.to_string(),
                });
                invalid.push(head.clone());
            }
            Err(err) => return Err(err),
        }
    }
    if governed.is_empty() {
        return Err(HistoryError::EmptyHistory);
    }

    // 2. prune heads already covered by a snapshot
    let mut covered: HashSet<ChangeId> = HashSet::new();
    for (_, snapshot_id) in &governed {
        let snapshot = loader.load(snapshot_id).await?;
        if let Some(snapshot) = &snapshot.snapshot {
            covered.extend(snapshot.log_heads.values().cloned());
        }
    }
    let (subsumed, kept): (Vec<_>, Vec<_>) = governed
        .iter()
        .cloned()
        .partition(|(head, snapshot)| covered.contains(head) && head != snapshot);
    let kept = if kept.is_empty() {
        // Every head claims to be covered; nothing sensible to prune.
        governed
    } else {
        report
            .subsumed_heads
            .extend(subsumed.into_iter().map(|(head, _)| head));
        kept
    };

    // 3. pairwise reduction, last two first
    let mut snapshots: Vec<ChangeId> = Vec::new();
    for (_, snapshot) in &kept {
        if !snapshots.contains(snapshot) {
            snapshots.push(snapshot.clone());
        }
    }
    while snapshots.len() > 1 {
        let b = snapshots.pop().ok_or(HistoryError::EmptyHistory)?;
        let a = snapshots.pop().ok_or(HistoryError::EmptyHistory)?;
        let common = common_snapshot(loader, &a, &b, config, report).await?;
        snapshots.push(common);
    }
    let breakpoint = snapshots.pop().ok_or(HistoryError::EmptyHistory)?;

    tracing::debug!(
        breakpoint = %breakpoint,
        heads = kept.len(),
        subsumed = report.subsumed_heads.len(),
        "resolved breakpoint"
    );
    Ok(Resolution {
        breakpoint,
        heads: kept.into_iter().map(|(head, _)| head).collect(),
        invalid,
    })
}

async fn governing_snapshot(loader: &mut ChangeLoader<'_>, head: &ChangeId) -> Result<Option<ChangeId>> {
    let change = loader.load(head).await?;
    let Some(snapshot_id) = change.governing_snapshot().cloned() else {
        return Ok(None);
    };
    // The governing snapshot must itself decode for the head to count.
    if snapshot_id != *head {
        loader.load(&snapshot_id).await?;
    }
    Ok(Some(snapshot_id))
}

/// Nearest snapshot shared by the snapshot chains of `a` and `b`.
pub async fn common_snapshot(
    loader: &mut ChangeLoader<'_>,
    a: &ChangeId,
    b: &ChangeId,
    config: &HistoryConfig,
    report: &mut BuildReport,
) -> Result<ChangeId> {
    if a == b {
        return Ok(a.clone());
    }
    let change_a = loader.load(a).await?;
    let change_b = loader.load(b).await?;
    let last_a = change_a.last_snapshot_id.clone().filter(|id| !id.is_empty());
    let last_b = change_b.last_snapshot_id.clone().filter(|id| !id.is_empty());

    if last_a.as_ref() == Some(b) {
        return Ok(b.clone());
    }
    if last_b.as_ref() == Some(a) {
        return Ok(a.clone());
    }
    if let (Some(x), Some(y)) = (&last_a, &last_b) {
        if x == y {
            return Ok(x.clone());
        }
    }

    // Extend both chains alternately; first id seen on both wins.
    let mut chain_a: HashSet<ChangeId> = HashSet::from([a.clone()]);
    let mut chain_b: HashSet<ChangeId> = HashSet::from([b.clone()]);
    let (mut next_a, mut next_b) = (last_a, last_b);
    let mut steps = 0usize;
    while next_a.is_some() || next_b.is_some() {
        steps += 1;
        if steps > config.max_snapshot_chain {
            return Err(HistoryError::SnapshotChainTooLong(a.clone()));
        }
        if let Some(id) = next_a.take() {
            if chain_b.contains(&id) {
                return Ok(id);
            }
            next_a = step(loader, &id).await?;
            chain_a.insert(id);
        }
        if let Some(id) = next_b.take() {
            if chain_a.contains(&id) {
                return Ok(id);
            }
            next_b = step(loader, &id).await?;
            chain_b.insert(id);
        }
    }

    let (kept, dropped) = if a < b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) };
    if !config.lenient_versions_split {
        return Err(HistoryError::VersionsSplit { a: kept, b: dropped });
    }
    tracing::warn!(
        target: "kiroku::history::split",
        kept = %kept,
        dropped = %dropped,
        "versions split: no common snapshot, keeping lesser id"
    );
    report.warn(BuildWarning::VersionsSplit {
        kept: kept.clone(),
        dropped,
    });
    Ok(kept)
}

async fn step(loader: &mut ChangeLoader<'_>, id: &ChangeId) -> Result<Option<ChangeId>> {
    let change = loader.load(id).await?;
    Ok(change.last_snapshot_id.clone().filter(|next| !next.is_empty()))
}
