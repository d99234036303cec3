//! A live document: tree, replayed state, and incremental updates.
//!
//! New heads arrive from the store subscription. The missing part of their
//! history is loaded and added to the tree; depending on the outcome only
//! the newly attached changes are replayed (`Append`), the whole tree is
//! replayed again (`Rebuild`), or nothing happens.
//!
//! A document is not internally synchronized. Callers that share one across
//! tasks wrap it in a mutex.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kiroku_history::{
    AddOutcome, BuildReport, Change, ChangeLoader, DagBuilder, HeadUpdate, PostcardCodec, RecordStore, Tree,
};
use kiroku_state::DocumentState;
use kiroku_types::ChangeId;

use crate::config::KernelConfig;
use crate::replay::StateReplayer;
use crate::{KernelError, Result};

pub struct HistoryDocument {
    store: Arc<dyn RecordStore>,
    root_id: String,
    config: KernelConfig,
    replayer: StateReplayer,
    tree: Tree,
    state: DocumentState,
    /// Changes already folded into `state`.
    applied: HashSet<ChangeId>,
    report: BuildReport,
}

impl HistoryDocument {
    /// Builds the tree from the store's current heads and replays it.
    pub async fn open(store: Arc<dyn RecordStore>, root_id: impl Into<String>, config: KernelConfig) -> Result<Self> {
        let replayer = StateReplayer::new(config.normalize.clone());
        let mut document = Self {
            store,
            root_id: root_id.into(),
            config,
            replayer,
            tree: Tree::new(),
            state: DocumentState::default(),
            applied: HashSet::new(),
            report: BuildReport::default(),
        };
        document.reload().await?;
        Ok(document)
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    /// Diagnostics of the last full build.
    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    pub fn heads(&self) -> &[ChangeId] {
        self.tree.heads()
    }

    /// Rebuilds the tree from the store and replays it from scratch.
    pub async fn reload(&mut self) -> Result<()> {
        let built = DagBuilder::new(&*self.store, &PostcardCodec)
            .with_config(self.config.history.clone())
            .build_tree()
            .await?;
        self.tree = built.tree;
        self.report = built.report;
        self.replay_all()
    }

    fn replay_all(&mut self) -> Result<()> {
        let (state, applied) = self.replayer.replay(&self.root_id, &self.tree)?;
        self.state = state;
        self.applied = self.tree.canonical_ids().into_iter().collect();
        debug!(applied, "document replayed");
        Ok(())
    }

    /// Brings the document up to date with `heads`. Returns how the tree
    /// moved.
    pub async fn apply_heads(&mut self, heads: &[ChangeId]) -> Result<AddOutcome> {
        let batch = match self.load_missing(heads).await {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                self.reload().await?;
                return Ok(AddOutcome::Rebuild);
            }
            Err(KernelError::History(err)) if err.is_decode_failed() => {
                warn!(error = %err, "new history does not decode, rebuilding from store");
                self.reload().await?;
                return Ok(AddOutcome::Rebuild);
            }
            Err(err) => return Err(err),
        };
        if batch.is_empty() {
            return Ok(AddOutcome::Nothing);
        }

        let outcome = self.tree.add(batch);
        match outcome {
            AddOutcome::Nothing => {}
            AddOutcome::Append => {
                let pending: Vec<Arc<Change>> = self
                    .tree
                    .canonical_ids()
                    .into_iter()
                    .filter(|id| !self.applied.contains(id))
                    .filter_map(|id| self.tree.get(&id).cloned())
                    .collect();
                let state = std::mem::take(&mut self.state);
                let (state, applied) = self.replayer.replay_changes(state, &pending)?;
                self.state = state;
                self.applied.extend(pending.iter().map(|c| c.id.clone()));
                info!(applied, heads = self.tree.heads().len(), "appended changes");
            }
            AddOutcome::Rebuild => {
                info!(changes = self.tree.len(), "rebuilding document state");
                self.replay_all()?;
            }
        }
        Ok(outcome)
    }

    /// Loads every change between `heads` and the current tree. `None`
    /// means the new history reaches outside the tree's snapshot lineage and
    /// needs a full build.
    async fn load_missing(&self, heads: &[ChangeId]) -> Result<Option<Vec<Arc<Change>>>> {
        let mut loader = ChangeLoader::new(&*self.store, &PostcardCodec, CancellationToken::new());
        let mut batch = Vec::new();
        let mut seen: HashSet<ChangeId> = HashSet::new();
        let mut stack: Vec<ChangeId> = heads.iter().filter(|h| !self.tree.contains(h)).cloned().collect();

        while let Some(id) = stack.pop() {
            if self.tree.contains(&id) || !seen.insert(id.clone()) {
                continue;
            }
            let change = loader.load(&id).await?;
            if change.previous_ids.is_empty() {
                debug!(change = %change.id, "new root-less change, full rebuild");
                return Ok(None);
            }
            stack.extend(change.previous_ids.iter().filter(|p| !self.tree.contains(p)).cloned());
            batch.push(change);
        }

        let loaded: HashSet<&ChangeId> = batch.iter().map(|c| &c.id).collect();
        let outside = batch.iter().any(|change| {
            change
                .last_snapshot_id
                .as_ref()
                .filter(|id| !id.is_empty())
                .is_some_and(|snapshot| !self.tree.contains(snapshot) && !loaded.contains(snapshot))
        });
        Ok(if outside { None } else { Some(batch) })
    }

    /// Subscribes to the store's head updates.
    pub fn subscribe(&self) -> Result<(mpsc::UnboundedReceiver<HeadUpdate>, CancellationToken)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.store.subscribe_for_records(tx)?;
        Ok((rx, cancel))
    }

    /// Applies head updates as they arrive until `cancel` fires or the
    /// subscription closes. Updates already queued are applied together.
    pub async fn follow(&mut self, updates: &mut mpsc::UnboundedReceiver<HeadUpdate>, cancel: &CancellationToken) -> Result<()> {
        loop {
            let first = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                update = updates.recv() => match update {
                    Some(update) => update,
                    None => return Ok(()),
                },
            };
            let mut heads = vec![first.head];
            while let Ok(update) = updates.try_recv() {
                heads.push(update.head);
            }
            heads.sort();
            heads.dedup();
            let outcome = self.apply_heads(&heads).await?;
            debug!(?outcome, heads = heads.len(), "head update applied");
        }
    }
}
