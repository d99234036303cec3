//! SQLite record store.
//!
//! Records are immutable blobs keyed by change id; logs map a device log id
//! to its current head. Head moves fan out to subscribers.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kiroku_history::{HeadUpdate, HistoryError, Log, RawRecord, RecordSink, RecordStore, Subscribers};
use kiroku_types::ChangeId;

const SCHEMA: &str = r#"
-- Change records (content-addressed, immutable)
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    created_at INTEGER DEFAULT (unixepoch())
);

-- Device logs and their heads
CREATE TABLE IF NOT EXISTS logs (
    id TEXT PRIMARY KEY,
    head TEXT NOT NULL,
    updated_at INTEGER DEFAULT (unixepoch())
);
"#;

fn store_err(e: rusqlite::Error) -> HistoryError {
    HistoryError::Store(e.to_string())
}

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    subscribers: Subscribers,
}

impl SqliteRecordStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            subscribers: Subscribers::default(),
        })
    }

    /// Insert a record. Re-inserting an id keeps the first bytes.
    pub fn insert_record(&self, id: &ChangeId, data: &[u8]) -> rusqlite::Result<()> {
        self.conn.lock().execute(
            "INSERT OR IGNORE INTO records (id, data) VALUES (?1, ?2)",
            params![id.as_str(), data],
        )?;
        Ok(())
    }

    /// Move a log head and notify subscribers.
    pub fn set_head(&self, log_id: &str, head: &ChangeId) -> rusqlite::Result<()> {
        self.conn.lock().execute(
            "INSERT INTO logs (id, head) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET head = excluded.head, updated_at = unixepoch()",
            params![log_id, head.as_str()],
        )?;
        self.subscribers.notify(&HeadUpdate {
            log_id: log_id.to_string(),
            head: head.clone(),
        });
        Ok(())
    }

    pub fn remove_log(&self, log_id: &str) -> rusqlite::Result<bool> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM logs WHERE id = ?1", params![log_id])?;
        Ok(removed > 0)
    }

    pub fn record_count(&self) -> rusqlite::Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn logs(&self) -> rusqlite::Result<Vec<Log>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, head FROM logs ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let head: String = row.get(1)?;
            Ok(Log::new(id, head))
        })?;
        rows.collect()
    }

    fn record(&self, id: &ChangeId) -> rusqlite::Result<Option<Vec<u8>>> {
        self.conn
            .lock()
            .query_row("SELECT data FROM records WHERE id = ?1", params![id.as_str()], |row| {
                row.get(0)
            })
            .optional()
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get_logs(&self) -> kiroku_history::Result<Vec<Log>> {
        self.logs().map_err(store_err)
    }

    #[tracing::instrument(skip_all, name = "store.get_record", fields(change = %id))]
    async fn get_record(&self, ctx: &CancellationToken, id: &ChangeId) -> kiroku_history::Result<RawRecord> {
        if ctx.is_cancelled() {
            return Err(HistoryError::Canceled);
        }
        let data = self
            .record(id)
            .map_err(store_err)?
            .ok_or_else(|| HistoryError::RecordNotFound(id.clone()))?;
        Ok(RawRecord { id: id.clone(), data })
    }

    fn subscribe_for_records(&self, sink: mpsc::UnboundedSender<HeadUpdate>) -> kiroku_history::Result<CancellationToken> {
        Ok(self.subscribers.add(sink))
    }
}

#[async_trait]
impl RecordSink for SqliteRecordStore {
    async fn put_record(&self, record: RawRecord) -> kiroku_history::Result<()> {
        self.insert_record(&record.id, &record.data).map_err(store_err)
    }

    async fn set_log_head(&self, log_id: &str, head: &ChangeId) -> kiroku_history::Result<()> {
        self.set_head(log_id, head).map_err(store_err)
    }
}
