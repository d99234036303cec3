//! Record store contract and an in-memory implementation.
//!
//! The store owns persistence and transport of raw change records. The core
//! consumes it through [`RecordStore`]; authoring code additionally writes
//! through [`RecordSink`].

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kiroku_types::ChangeId;

use crate::change::ChangeRecord;
use crate::codec::{ChangeCodec, PostcardCodec, content_address};
use crate::{HistoryError, Result};

/// Per-device append point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Log {
    pub id: String,
    pub head: ChangeId,
}

impl Log {
    pub fn new(id: impl Into<String>, head: impl Into<ChangeId>) -> Self {
        Self {
            id: id.into(),
            head: head.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RawRecord {
    pub id: ChangeId,
    pub data: Vec<u8>,
}

/// Pushed to subscribers whenever a log head moves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadUpdate {
    pub log_id: String,
    pub head: ChangeId,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_logs(&self) -> Result<Vec<Log>>;

    async fn get_record(&self, ctx: &CancellationToken, id: &ChangeId) -> Result<RawRecord>;

    /// Register `sink` for head updates. Cancel the returned token to stop.
    fn subscribe_for_records(&self, sink: mpsc::UnboundedSender<HeadUpdate>) -> Result<CancellationToken>;
}

#[async_trait]
pub trait RecordSink: RecordStore {
    async fn put_record(&self, record: RawRecord) -> Result<()>;

    /// Move a log head and notify subscribers.
    async fn set_log_head(&self, log_id: &str, head: &ChangeId) -> Result<()>;
}

/// Fan-out of head updates to live subscribers. Shared by store backends.
#[derive(Default)]
pub struct Subscribers {
    sinks: RwLock<Vec<(CancellationToken, mpsc::UnboundedSender<HeadUpdate>)>>,
}

impl Subscribers {
    pub fn add(&self, sink: mpsc::UnboundedSender<HeadUpdate>) -> CancellationToken {
        let token = CancellationToken::new();
        self.sinks.write().push((token.clone(), sink));
        token
    }

    /// Deliver to every live sink, pruning canceled or closed ones.
    pub fn notify(&self, update: &HeadUpdate) {
        self.sinks.write().retain(|(token, sink)| {
            !token.is_cancelled() && sink.send(update.clone()).is_ok()
        });
    }

    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct MemoryInner {
    records: HashMap<ChangeId, Vec<u8>>,
    logs: BTreeMap<String, ChangeId>,
}

/// In-memory record store, for tests and ephemeral documents.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: RwLock<MemoryInner>,
    subscribers: Subscribers,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes under an explicit id, bypassing content addressing.
    pub fn insert_raw(&self, id: impl Into<ChangeId>, data: Vec<u8>) {
        self.inner.write().records.insert(id.into(), data);
    }

    /// Encode and store `record` under an explicit id.
    pub fn insert_record(&self, id: impl Into<ChangeId>, record: &ChangeRecord) -> Result<()> {
        let data = PostcardCodec.encode(record)?;
        self.insert_raw(id, data);
        Ok(())
    }

    /// Encode and store `record` under its content address.
    pub fn insert_addressed(&self, record: &ChangeRecord) -> Result<ChangeId> {
        let data = PostcardCodec.encode(record)?;
        let id = content_address(&data);
        self.insert_raw(id.clone(), data);
        Ok(id)
    }

    /// Move a log head without going through the async sink path.
    pub fn set_head(&self, log_id: impl Into<String>, head: impl Into<ChangeId>) {
        let update = HeadUpdate {
            log_id: log_id.into(),
            head: head.into(),
        };
        self.inner
            .write()
            .logs
            .insert(update.log_id.clone(), update.head.clone());
        self.subscribers.notify(&update);
    }

    pub fn remove_log(&self, log_id: &str) {
        self.inner.write().logs.remove(log_id);
    }

    pub fn record_count(&self) -> usize {
        self.inner.read().records.len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_logs(&self) -> Result<Vec<Log>> {
        Ok(self
            .inner
            .read()
            .logs
            .iter()
            .map(|(id, head)| Log::new(id.clone(), head.clone()))
            .collect())
    }

    async fn get_record(&self, ctx: &CancellationToken, id: &ChangeId) -> Result<RawRecord> {
        if ctx.is_cancelled() {
            return Err(HistoryError::Canceled);
        }
        let inner = self.inner.read();
        let data = inner
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| HistoryError::RecordNotFound(id.clone()))?;
        Ok(RawRecord {
            id: id.clone(),
            data,
        })
    }

    fn subscribe_for_records(&self, sink: mpsc::UnboundedSender<HeadUpdate>) -> Result<CancellationToken> {
        Ok(self.subscribers.add(sink))
    }
}

#[async_trait]
impl RecordSink for MemoryRecordStore {
    async fn put_record(&self, record: RawRecord) -> Result<()> {
        self.inner.write().records.insert(record.id, record.data);
        Ok(())
    }

    async fn set_log_head(&self, log_id: &str, head: &ChangeId) -> Result<()> {
        self.set_head(log_id, head.clone());
        Ok(())
    }
}
