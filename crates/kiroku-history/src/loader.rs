//! Pass-scoped change loading.
//!
//! A [`ChangeLoader`] is created at the start of a build pass, caches every
//! decoded change (and every decode failure) for the duration of the pass,
//! and is dropped with it. `load` is the only suspension point of the core.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use kiroku_types::ChangeId;

use crate::change::Change;
use crate::codec::ChangeCodec;
use crate::store::RecordStore;
use crate::{HistoryError, Result};

pub struct ChangeLoader<'a> {
    store: &'a dyn RecordStore,
    codec: &'a dyn ChangeCodec,
    cancel: CancellationToken,
    cache: HashMap<ChangeId, Arc<Change>>,
    failed: HashMap<ChangeId, HistoryError>,
    fetches: usize,
}

impl<'a> ChangeLoader<'a> {
    pub fn new(store: &'a dyn RecordStore, codec: &'a dyn ChangeCodec, cancel: CancellationToken) -> Self {
        Self {
            store,
            codec,
            cancel,
            cache: HashMap::new(),
            failed: HashMap::new(),
            fetches: 0,
        }
    }

    /// Load and decode a change, at most once per pass.
    ///
    /// Returns `Canceled` as soon as the pass token is canceled, even for ids
    /// already in the cache.
    pub async fn load(&mut self, id: &ChangeId) -> Result<Arc<Change>> {
        if self.cancel.is_cancelled() {
            return Err(HistoryError::Canceled);
        }
        if let Some(change) = self.cache.get(id) {
            return Ok(change.clone());
        }
        if let Some(err) = self.failed.get(id) {
            return Err(err.clone());
        }

        self.fetches += 1;
        let raw = self.store.get_record(&self.cancel, id).await?;
        match self.codec.decode(id, &raw.data) {
            Ok(change) => {
                let change = Arc::new(change);
                self.cache.insert(id.clone(), change.clone());
                Ok(change)
            }
            Err(err) => {
                tracing::warn!(change = %id, error = %err, "change failed to decode");
                self.failed.insert(id.clone(), err.clone());
                Err(err)
            }
        }
    }

    pub fn cached(&self, id: &ChangeId) -> Option<Arc<Change>> {
        self.cache.get(id).cloned()
    }

    /// Number of store round-trips made so far.
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
