//! The change record and its decoded form.
//!
//! [`ChangeRecord`] is what gets encoded and stored; [`Change`] is what the
//! loader hands to the resolver and the tree. Content operations stay encoded
//! inside the record until someone asks for them, because building a tree only
//! needs ids, parents, and snapshot metadata.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use kiroku_types::{BaseSnapshot, ChangeContent, ChangeId, FileKeys};

use crate::{HistoryError, Result};

/// Snapshot payload: a full document base plus the per-log heads it covers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub base: BaseSnapshot,
    /// Log id → head change id at snapshot time.
    pub log_heads: BTreeMap<String, ChangeId>,
}

/// Stored form of a change. The id is not part of the record; it is the
/// content address of the encoded bytes (or whatever the store keys it by).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub previous_ids: Vec<ChangeId>,
    /// Nearest snapshot ancestor; `None` only for the very first snapshot.
    pub last_snapshot_id: Option<ChangeId>,
    pub snapshot: Option<Snapshot>,
    /// Postcard-encoded `Vec<ChangeContent>`, decoded lazily.
    pub content: Vec<u8>,
    pub file_keys: Vec<FileKeys>,
    pub timestamp: i64,
    pub author: String,
}

impl ChangeRecord {
    /// A snapshot record. The root snapshot has no parents.
    pub fn snapshot<I>(previous_ids: I, last_snapshot_id: Option<ChangeId>, snapshot: Snapshot) -> Self
    where
        I: IntoIterator<Item = ChangeId>,
    {
        Self {
            previous_ids: previous_ids.into_iter().collect(),
            last_snapshot_id,
            snapshot: Some(snapshot),
            ..Default::default()
        }
    }

    /// A plain (non-snapshot) record.
    pub fn change<I>(previous_ids: I, last_snapshot_id: ChangeId) -> Self
    where
        I: IntoIterator<Item = ChangeId>,
    {
        Self {
            previous_ids: previous_ids.into_iter().collect(),
            last_snapshot_id: Some(last_snapshot_id),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, ops: &[ChangeContent]) -> Result<Self> {
        self.content = encode_content(ops)?;
        Ok(self)
    }

    pub fn with_file_keys(mut self, keys: Vec<FileKeys>) -> Self {
        self.file_keys = keys;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>, timestamp: i64) -> Self {
        self.author = author.into();
        self.timestamp = timestamp;
        self
    }
}

pub fn encode_content(ops: &[ChangeContent]) -> Result<Vec<u8>> {
    postcard::to_allocvec(ops).map_err(|e| HistoryError::Encode(e.to_string()))
}

/// A decoded change.
#[derive(Clone, Debug)]
pub struct Change {
    pub id: ChangeId,
    pub previous_ids: Vec<ChangeId>,
    pub last_snapshot_id: Option<ChangeId>,
    pub snapshot: Option<Arc<Snapshot>>,
    pub file_keys: Vec<FileKeys>,
    pub timestamp: i64,
    pub author: String,
    raw_content: Arc<[u8]>,
    content: OnceLock<std::result::Result<Arc<[ChangeContent]>, String>>,
}

impl Change {
    pub fn from_record(id: ChangeId, record: ChangeRecord) -> Self {
        Self {
            id,
            previous_ids: record.previous_ids,
            last_snapshot_id: record.last_snapshot_id,
            snapshot: record.snapshot.map(Arc::new),
            file_keys: record.file_keys,
            timestamp: record.timestamp,
            author: record.author,
            raw_content: Arc::from(record.content),
            content: OnceLock::new(),
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// The snapshot that governs this change: itself when it is a snapshot,
    /// otherwise one step along `last_snapshot_id`.
    pub fn governing_snapshot(&self) -> Option<&ChangeId> {
        if self.is_snapshot() {
            Some(&self.id)
        } else {
            self.last_snapshot_id.as_ref().filter(|id| !id.is_empty())
        }
    }

    /// Content operations, decoded on first access.
    ///
    /// A failure here means the record passed envelope decoding but carries
    /// corrupt content; it is fatal for the replay pass that asked.
    pub fn content(&self) -> Result<Arc<[ChangeContent]>> {
        let decoded = self.content.get_or_init(|| {
            if self.raw_content.is_empty() {
                return Ok(Arc::from(Vec::new()));
            }
            postcard::from_bytes::<Vec<ChangeContent>>(&self.raw_content)
                .map(Arc::from)
                .map_err(|e| e.to_string())
        });
        decoded
            .clone()
            .map_err(|reason| HistoryError::decode(&self.id, reason))
    }

    /// Snapshots and changes with details, relation, or object-type ops.
    pub fn is_details_meta(&self) -> bool {
        if self.is_snapshot() {
            return true;
        }
        match self.content() {
            Ok(ops) => ops.iter().any(ChangeContent::is_details_meta),
            Err(e) => {
                tracing::warn!(change = %self.id, error = %e, "undecodable content treated as non-meta");
                false
            }
        }
    }

    /// Same change re-parented onto a different predecessor list. Used to
    /// project sub-histories such as the details tree.
    pub fn with_previous_ids(&self, previous_ids: Vec<ChangeId>) -> Self {
        let mut change = self.clone();
        change.previous_ids = previous_ids;
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiroku_types::Value;

    #[test]
    fn test_content_decoded_lazily() {
        let ops = vec![ChangeContent::DetailsSet {
            key: "name".into(),
            value: Value::from("doc"),
        }];
        let record = ChangeRecord::change(["s0".into()], "s0".into())
            .with_content(&ops)
            .unwrap();
        let change = Change::from_record("c1".into(), record);
        assert_eq!(&*change.content().unwrap(), ops.as_slice());
        assert!(change.is_details_meta());
    }

    #[test]
    fn test_corrupt_content_is_decode_failed() {
        let mut record = ChangeRecord::change(["s0".into()], "s0".into());
        record.content = vec![0xff, 0xff, 0xff];
        let change = Change::from_record("c1".into(), record);
        assert!(change.content().unwrap_err().is_decode_failed());
        assert!(!change.is_details_meta());
    }

    #[test]
    fn test_governing_snapshot() {
        let snap = Change::from_record(
            "s0".into(),
            ChangeRecord::snapshot([], None, Snapshot::default()),
        );
        assert_eq!(snap.governing_snapshot(), Some(&ChangeId::from("s0")));

        let child = Change::from_record("c0".into(), ChangeRecord::change(["s0".into()], "s0".into()));
        assert_eq!(child.governing_snapshot(), Some(&ChangeId::from("s0")));

        let orphan = Change::from_record("x".into(), ChangeRecord::default());
        assert_eq!(orphan.governing_snapshot(), None);
    }

    #[test]
    fn test_empty_content() {
        let change = Change::from_record("c".into(), ChangeRecord::change([], "s0".into()));
        assert!(change.content().unwrap().is_empty());
    }
}
