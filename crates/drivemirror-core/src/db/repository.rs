//! Mirror store: trait and `SQLite` implementation

#![allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation, clippy::cast_sign_loss)] // SQLite uses i64 for counts

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tokio::task;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{
    LocalFields, MirrorRecord, SessionCounts, SyncCheckpoint, SyncSessionRecord,
};

const RECORD_COLUMNS: &str = "id, root_id, parent_id, name, kind, mime_type, size_bytes, \
     remote_modified_at, local_fields, path, path_depth, is_deleted, deleted_at, last_synced_at";

const SESSION_COLUMNS: &str = "session_id, root_id, started_at, finished_at, status, \
     detected_count, added_count, updated_count, deleted_count, skipped_count, error_count, \
     conflict_strategy, dry_run, errors";

/// Transactional storage for mirror rows, checkpoints and session history
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Insert or update rows in one transaction; `local_fields` of existing rows are kept
    async fn upsert_batch(&self, records: &[MirrorRecord]) -> Result<()>;

    /// Flag active rows as deleted in one transaction, returning how many changed
    async fn soft_delete_batch(&self, ids: &[String], deleted_at: i64) -> Result<usize>;

    /// Remove rows in one transaction, returning how many were removed
    async fn hard_delete_batch(&self, ids: &[String]) -> Result<usize>;

    /// Every row of a subtree, soft-deleted ones included
    async fn query_by_root(&self, root_id: &str) -> Result<Vec<MirrorRecord>>;

    async fn load_checkpoint(&self, root_id: &str) -> Result<Option<SyncCheckpoint>>;

    async fn save_checkpoint(&self, checkpoint: &SyncCheckpoint) -> Result<()>;

    /// Append a finished session; history rows are never updated
    async fn append_session_record(&self, record: &SyncSessionRecord) -> Result<()>;

    /// Session history, newest first
    async fn list_session_records(
        &self,
        root_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SyncSessionRecord>>;
}

/// `SQLite` implementation of [`MirrorStore`].
///
/// Statements run on the blocking thread pool; the connection is shared
/// behind a mutex, so writes are serialized as `SQLite` requires.
#[derive(Clone)]
pub struct SqliteMirrorStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteMirrorStore {
    /// Open (and migrate) a mirror database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_database(Database::open(path)?))
    }

    /// Open an in-memory mirror (primarily for tests)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` against the connection on the blocking pool
    async fn execute_blocking<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let db = db.lock().unwrap_or_else(PoisonError::into_inner);
            f(db.connection())
        })
        .await
        .map_err(|e| Error::Database(format!("Task join error: {e}")))?
    }

    /// Run `f` inside one transaction on the blocking pool; commits on `Ok`
    async fn execute_transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let mut db = db.lock().unwrap_or_else(PoisonError::into_inner);
            let tx = db.connection_mut().transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(|e| Error::Database(format!("Task join error: {e}")))?
    }

    /// Fetch one row by id, soft-deleted or not
    pub async fn get_record(&self, id: &str) -> Result<Option<MirrorRecord>> {
        let id = id.to_string();
        self.execute_blocking(move |conn| {
            let record = conn
                .query_row(
                    &format!("SELECT {RECORD_COLUMNS} FROM mirror_records WHERE id = ?"),
                    params![id],
                    parse_record,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    /// Rows of a subtree ordered by path
    pub async fn list_records(
        &self,
        root_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<MirrorRecord>> {
        let root_id = root_id.to_string();
        self.execute_blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM mirror_records
                 WHERE root_id = ? AND (? OR is_deleted = 0)
                 ORDER BY path ASC, id ASC"
            ))?;
            let records = stmt
                .query_map(params![root_id, include_deleted], parse_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    /// Replace the mirror-owned fields of a row
    pub async fn set_local_fields(&self, id: &str, fields: &LocalFields) -> Result<()> {
        let payload = serde_json::to_string(fields)?;
        let id = id.to_string();
        self.execute_blocking(move |conn| {
            let rows = conn.execute(
                "UPDATE mirror_records SET local_fields = ? WHERE id = ?",
                params![payload, id],
            )?;
            if rows == 0 {
                return Err(Error::NotFound(id));
            }
            Ok(())
        })
        .await
    }
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}

/// Parse a mirror record from a database row
fn parse_record(row: &Row<'_>) -> rusqlite::Result<MirrorRecord> {
    let kind: String = row.get(4)?;
    let local_fields: String = row.get(8)?;
    Ok(MirrorRecord {
        id: row.get(0)?,
        root_id: row.get(1)?,
        parent_id: row.get(2)?,
        name: row.get(3)?,
        kind: kind.parse().map_err(|e| conversion_error(4, e))?,
        mime_type: row.get(5)?,
        size_bytes: row.get(6)?,
        remote_modified_at: row.get(7)?,
        local_fields: serde_json::from_str(&local_fields)
            .map_err(|e| conversion_error(8, e.to_string()))?,
        path: row.get(9)?,
        path_depth: row.get(10)?,
        is_deleted: row.get::<_, i32>(11)? != 0,
        deleted_at: row.get(12)?,
        last_synced_at: row.get(13)?,
    })
}

/// Parse a session record from a database row
fn parse_session(row: &Row<'_>) -> rusqlite::Result<SyncSessionRecord> {
    let session_id: String = row.get(0)?;
    let status: String = row.get(4)?;
    let strategy: String = row.get(11)?;
    let errors: String = row.get(13)?;
    Ok(SyncSessionRecord {
        session_id: session_id
            .parse()
            .map_err(|e: uuid::Error| conversion_error(0, e.to_string()))?,
        root_id: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        status: status.parse().map_err(|e| conversion_error(4, e))?,
        counts: SessionCounts {
            detected: row.get::<_, i64>(5)? as usize,
            added: row.get::<_, i64>(6)? as usize,
            updated: row.get::<_, i64>(7)? as usize,
            deleted: row.get::<_, i64>(8)? as usize,
            skipped: row.get::<_, i64>(9)? as usize,
            errors: row.get::<_, i64>(10)? as usize,
        },
        conflict_strategy_used: strategy.parse().map_err(|e| conversion_error(11, e))?,
        dry_run: row.get::<_, i32>(12)? != 0,
        errors: serde_json::from_str(&errors).map_err(|e| conversion_error(13, e.to_string()))?,
    })
}

#[async_trait]
impl MirrorStore for SqliteMirrorStore {
    async fn upsert_batch(&self, records: &[MirrorRecord]) -> Result<()> {
        let records = records.to_vec();
        self.execute_transaction(move |tx| {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO mirror_records ({RECORD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(id) DO UPDATE SET
                    root_id = excluded.root_id,
                    parent_id = excluded.parent_id,
                    name = excluded.name,
                    kind = excluded.kind,
                    mime_type = excluded.mime_type,
                    size_bytes = excluded.size_bytes,
                    remote_modified_at = excluded.remote_modified_at,
                    path = excluded.path,
                    path_depth = excluded.path_depth,
                    is_deleted = excluded.is_deleted,
                    deleted_at = excluded.deleted_at,
                    last_synced_at = excluded.last_synced_at"
            ))?;
            for record in &records {
                let local_fields = serde_json::to_string(&record.local_fields)?;
                stmt.execute(params![
                    record.id,
                    record.root_id,
                    record.parent_id,
                    record.name,
                    record.kind.as_str(),
                    record.mime_type,
                    record.size_bytes,
                    record.remote_modified_at,
                    local_fields,
                    record.path,
                    record.path_depth,
                    i32::from(record.is_deleted),
                    record.deleted_at,
                    record.last_synced_at,
                ])?;
            }
            Ok(())
        })
        .await
    }

    async fn soft_delete_batch(&self, ids: &[String], deleted_at: i64) -> Result<usize> {
        let ids = ids.to_vec();
        self.execute_transaction(move |tx| {
            let mut stmt = tx.prepare(
                "UPDATE mirror_records SET is_deleted = 1, deleted_at = ?
                 WHERE id = ? AND is_deleted = 0",
            )?;
            let mut changed = 0;
            for id in &ids {
                changed += stmt.execute(params![deleted_at, id])?;
            }
            Ok(changed)
        })
        .await
    }

    async fn hard_delete_batch(&self, ids: &[String]) -> Result<usize> {
        let ids = ids.to_vec();
        self.execute_transaction(move |tx| {
            let mut stmt = tx.prepare("DELETE FROM mirror_records WHERE id = ?")?;
            let mut removed = 0;
            for id in &ids {
                removed += stmt.execute(params![id])?;
            }
            Ok(removed)
        })
        .await
    }

    async fn query_by_root(&self, root_id: &str) -> Result<Vec<MirrorRecord>> {
        self.list_records(root_id, true).await
    }

    async fn load_checkpoint(&self, root_id: &str) -> Result<Option<SyncCheckpoint>> {
        let root_id = root_id.to_string();
        self.execute_blocking(move |conn| {
            let checkpoint = conn
                .query_row(
                    "SELECT root_id, last_successful_sync_at, last_cursor_token
                     FROM sync_checkpoints WHERE root_id = ?",
                    params![root_id],
                    |row| {
                        Ok(SyncCheckpoint {
                            root_id: row.get(0)?,
                            last_successful_sync_at: row.get(1)?,
                            last_cursor_token: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(checkpoint)
        })
        .await
    }

    async fn save_checkpoint(&self, checkpoint: &SyncCheckpoint) -> Result<()> {
        let now = crate::util::unix_millis_now();
        let checkpoint = checkpoint.clone();
        self.execute_blocking(move |conn| {
            conn.execute(
                "INSERT INTO sync_checkpoints (root_id, last_successful_sync_at, last_cursor_token, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(root_id) DO UPDATE SET
                    last_successful_sync_at = excluded.last_successful_sync_at,
                    last_cursor_token = excluded.last_cursor_token,
                    updated_at = excluded.updated_at",
                params![
                    checkpoint.root_id,
                    checkpoint.last_successful_sync_at,
                    checkpoint.last_cursor_token,
                    now
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn append_session_record(&self, record: &SyncSessionRecord) -> Result<()> {
        let errors = serde_json::to_string(&record.errors)?;
        let record = record.clone();
        self.execute_blocking(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO sync_sessions ({SESSION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    record.session_id.as_str(),
                    record.root_id,
                    record.started_at,
                    record.finished_at,
                    record.status.as_str(),
                    record.counts.detected as i64,
                    record.counts.added as i64,
                    record.counts.updated as i64,
                    record.counts.deleted as i64,
                    record.counts.skipped as i64,
                    record.counts.errors as i64,
                    record.conflict_strategy_used.as_str(),
                    i32::from(record.dry_run),
                    errors,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_session_records(
        &self,
        root_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SyncSessionRecord>> {
        let root_id = root_id.map(str::to_string);
        self.execute_blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sync_sessions
                 WHERE (?1 IS NULL OR root_id = ?1)
                 ORDER BY started_at DESC, session_id DESC
                 LIMIT ?2"
            ))?;
            let records = stmt
                .query_map(params![root_id, limit as i64], parse_session)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }
}
