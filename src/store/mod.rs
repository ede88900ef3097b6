//! SQLite persistence for per-file index records
//!
//! One row per physical log file: offsets, weights, timestamps, document
//! counts, and the group status machine. All writers go through the same
//! connection behind a mutex; WAL mode and a busy timeout keep concurrent
//! readers happy.

mod types;

pub use types::{IndexRecord, IndexStatus};

use crate::error::Result;
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Current Unix timestamp in seconds.
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The metadata database connection and operations.
pub struct IndexStore {
    conn: Connection,
    file_path: PathBuf,
}

impl IndexStore {
    /// Open (or create) the store at the given path and initialize schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let file_path = db_path.as_ref().to_path_buf();
        info!("Initializing index store at: {}", file_path.display());

        let conn = Connection::open(&file_path)?;

        // Wait up to 5 seconds for locks under concurrent access.
        conn.busy_timeout(std::time::Duration::from_millis(5000))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;

        let store = Self { conn, file_path };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            file_path: PathBuf::from(":memory:"),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS log_files (
                path TEXT PRIMARY KEY,
                group_key TEXT NOT NULL,
                last_modified INTEGER NOT NULL DEFAULT 0,
                last_weight INTEGER NOT NULL DEFAULT 0,
                last_position INTEGER NOT NULL DEFAULT 0,
                last_indexed INTEGER NOT NULL DEFAULT 0,
                index_started INTEGER NOT NULL DEFAULT 0,
                index_duration_ms INTEGER NOT NULL DEFAULT 0,
                min_timestamp INTEGER,
                max_timestamp INTEGER,
                doc_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'not_indexed',
                queue_position INTEGER NOT NULL DEFAULT 0,
                status_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_log_files_group ON log_files(group_key);
            CREATE INDEX IF NOT EXISTS idx_log_files_status ON log_files(status);",
        )?;
        Ok(())
    }

    fn record_from_row(row: &Row<'_>) -> rusqlite::Result<IndexRecord> {
        Ok(IndexRecord {
            path: PathBuf::from(row.get::<_, String>(0)?),
            group_key: PathBuf::from(row.get::<_, String>(1)?),
            last_modified: row.get(2)?,
            last_weight: row.get(3)?,
            last_position: row.get(4)?,
            last_indexed: row.get(5)?,
            index_started: row.get(6)?,
            index_duration_ms: row.get(7)?,
            min_timestamp: row.get(8)?,
            max_timestamp: row.get(9)?,
            doc_count: row.get(10)?,
            status: IndexStatus::parse(&row.get::<_, String>(11)?),
            queue_position: row.get(12)?,
            status_message: row.get(13)?,
        })
    }

    const RECORD_COLUMNS: &'static str = "path, group_key, last_modified, last_weight, \
         last_position, last_indexed, index_started, index_duration_ms, \
         min_timestamp, max_timestamp, doc_count, status, queue_position, status_message";

    /// Fetch the record for one physical path.
    pub fn get_record(&self, path: &Path) -> Result<Option<IndexRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM log_files WHERE path = ?1",
            Self::RECORD_COLUMNS
        ))?;

        match stmt.query_row(params![path_key(path)], Self::record_from_row) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Upsert a full record.
    pub fn save_record(&self, record: &IndexRecord) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO log_files
             (path, group_key, last_modified, last_weight, last_position,
              last_indexed, index_started, index_duration_ms, min_timestamp,
              max_timestamp, doc_count, status, queue_position, status_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                path_key(&record.path),
                path_key(&record.group_key),
                record.last_modified,
                record.last_weight,
                record.last_position,
                record.last_indexed,
                record.index_started,
                record.index_duration_ms,
                record.min_timestamp,
                record.max_timestamp,
                record.doc_count,
                record.status.as_str(),
                record.queue_position,
                record.status_message,
            ],
        )?;
        debug!("Saved index record for {}", record.path.display());
        Ok(())
    }

    /// All records, ordered by path.
    pub fn all_records(&self) -> Result<Vec<IndexRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM log_files ORDER BY path",
            Self::RECORD_COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::record_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Records belonging to one rotation group.
    pub fn records_for_group(&self, group_key: &Path) -> Result<Vec<IndexRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM log_files WHERE group_key = ?1 ORDER BY path",
            Self::RECORD_COLUMNS
        ))?;
        let rows = stmt.query_map(params![path_key(group_key)], Self::record_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Atomic status transition for one path. Creates the row if the path
    /// has never been recorded.
    pub fn update_status(
        &self,
        path: &Path,
        status: IndexStatus,
        queue_position: i64,
        message: Option<&str>,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE log_files SET status = ?1, queue_position = ?2, status_message = ?3
             WHERE path = ?4",
            params![status.as_str(), queue_position, message, path_key(path)],
        )?;

        if updated == 0 {
            let mut record = IndexRecord::new(path, path);
            record.status = status;
            record.queue_position = queue_position;
            record.status_message = message.map(str::to_string);
            self.save_record(&record)?;
        }

        debug!(
            "Status for {} -> {} (queue position {})",
            path.display(),
            status.as_str(),
            queue_position
        );
        Ok(())
    }

    /// Zero the read offsets of every record in a group. Forced full
    /// reindexes call this before touching any file so an interrupted run
    /// can never resume from a stale position.
    pub fn reset_group_positions(&self, group_key: &Path) -> Result<usize> {
        let count = self.conn.execute(
            "UPDATE log_files SET last_position = 0 WHERE group_key = ?1",
            params![path_key(group_key)],
        )?;
        debug!("Reset positions on {} records for group {}", count, group_key.display());
        Ok(count)
    }

    /// Reset every record of a group back to an unindexed baseline, clearing
    /// offsets, weights, and counters. Used when a full reindex is forced.
    pub fn reset_group_records(&self, group_key: &Path) -> Result<usize> {
        let count = self.conn.execute(
            "UPDATE log_files SET
                last_modified = 0, last_weight = 0, last_position = 0,
                last_indexed = 0, index_started = 0, index_duration_ms = 0,
                min_timestamp = NULL, max_timestamp = NULL, doc_count = 0,
                status = 'not_indexed', queue_position = 0, status_message = NULL
             WHERE group_key = ?1",
            params![path_key(group_key)],
        )?;
        debug!("Reset {} records for group {}", count, group_key.display());
        Ok(count)
    }

    /// Delete every record of a group.
    pub fn delete_group_records(&self, group_key: &Path) -> Result<usize> {
        let count = self.conn.execute(
            "DELETE FROM log_files WHERE group_key = ?1",
            params![path_key(group_key)],
        )?;
        debug!("Deleted {} records for group {}", count, group_key.display());
        Ok(count)
    }

    /// Current index generation: total document count and the newest
    /// observed modification time. The result cache validates entries
    /// against this pair.
    pub fn generation(&self) -> Result<(i64, i64)> {
        let generation = self.conn.query_row(
            "SELECT COALESCE(SUM(doc_count), 0), COALESCE(MAX(last_modified), 0) FROM log_files",
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok(generation)
    }

    /// Per-status group counts, for health reporting. A group's status is
    /// its canonical record's status.
    pub fn group_status_counts(&self) -> Result<Vec<(IndexStatus, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM log_files WHERE path = group_key GROUP BY status",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((IndexStatus::parse(&row.get::<_, String>(0)?), row.get::<_, i64>(1)?))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }
}
