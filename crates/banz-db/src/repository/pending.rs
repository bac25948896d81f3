//! # Pending Queue Repository
//!
//! The local durable queue of records written while the remote store was
//! unreachable.
//!
//! ## Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  enqueue()         pending=1 synced=0                                  │
//! │     │                                                                   │
//! │     ├── mark_edited()   record patched, edited=1                       │
//! │     ├── mark_deleted()  deleted=1                                      │
//! │     ▼                                                                   │
//! │  mark_synced()     pending=0 synced=1 remote_id=<id>                   │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  remove()          after the remote counterpart is observed            │
//! │                                                                         │
//! │  Entries are namespaced by (store, kind) and listed in the order       │
//! │  they were queued.                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::debug;

use super::{decode_time, encode_time, merge_patch};
use crate::error::{DbError, DbResult};
use banz_core::{PendingEntry, QueueKind};

#[derive(sqlx::FromRow)]
struct PendingRow {
    local_id: String,
    record: String,
    pending: bool,
    synced: bool,
    deleted: bool,
    edited: bool,
    remote_id: Option<String>,
    queued_at: String,
}

impl PendingRow {
    fn into_entry<T: DeserializeOwned>(self) -> DbResult<PendingEntry<T>> {
        Ok(PendingEntry {
            local_id: self.local_id,
            record: serde_json::from_str(&self.record)?,
            pending: self.pending,
            synced: self.synced,
            deleted: self.deleted,
            edited: self.edited,
            remote_id: self.remote_id,
            queued_at: decode_time(&self.queued_at)?,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT local_id, record, pending, synced, deleted, edited, remote_id, queued_at FROM pending_queue";

/// Repository for the local durable queue.
///
/// ## Usage
/// ```rust,ignore
/// let queue = db.pending_queue();
/// queue.enqueue("Banca Socorro", QueueKind::Sales, &PendingEntry::new(id, sale)).await?;
///
/// for entry in queue.list_pending::<Sale>("Banca Socorro", QueueKind::Sales).await? {
///     // replay against the remote store
/// }
/// ```
#[derive(Debug, Clone)]
pub struct PendingQueueRepository {
    pool: SqlitePool,
}

impl PendingQueueRepository {
    /// Creates a new PendingQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PendingQueueRepository { pool }
    }

    /// Appends an entry to the store's queue.
    ///
    /// ## Errors
    /// `UniqueViolation` if the local id is already queued.
    pub async fn enqueue<T: Serialize>(
        &self,
        store: &str,
        kind: QueueKind,
        entry: &PendingEntry<T>,
    ) -> DbResult<()> {
        let record = serde_json::to_string(&entry.record)?;
        let now = encode_time(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO pending_queue (
                store, kind, local_id, record, pending, synced, deleted, edited,
                remote_id, queued_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(store)
        .bind(kind.as_str())
        .bind(&entry.local_id)
        .bind(&record)
        .bind(entry.pending)
        .bind(entry.synced)
        .bind(entry.deleted)
        .bind(entry.edited)
        .bind(&entry.remote_id)
        .bind(encode_time(entry.queued_at))
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: entry.local_id.clone(),
            },
            other => other,
        })?;

        debug!(store = %store, kind = %kind, local_id = %entry.local_id, "Queued record");
        Ok(())
    }

    /// Every entry of the queue, oldest first.
    ///
    /// Includes synced and deleted entries; callers decide what to replay.
    pub async fn list_pending<T: DeserializeOwned>(
        &self,
        store: &str,
        kind: QueueKind,
    ) -> DbResult<Vec<PendingEntry<T>>> {
        let sql = format!(
            "{} WHERE store = ?1 AND kind = ?2 ORDER BY queued_at ASC, rowid ASC",
            SELECT_COLUMNS
        );
        let rows: Vec<PendingRow> = sqlx::query_as(&sql)
            .bind(store)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(PendingRow::into_entry).collect()
    }

    /// Gets one entry by local id.
    pub async fn get<T: DeserializeOwned>(
        &self,
        store: &str,
        kind: QueueKind,
        local_id: &str,
    ) -> DbResult<Option<PendingEntry<T>>> {
        let sql = format!(
            "{} WHERE store = ?1 AND kind = ?2 AND local_id = ?3",
            SELECT_COLUMNS
        );
        let row: Option<PendingRow> = sqlx::query_as(&sql)
            .bind(store)
            .bind(kind.as_str())
            .bind(local_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PendingRow::into_entry).transpose()
    }

    /// Records that the remote store now holds this entry.
    pub async fn mark_synced(
        &self,
        store: &str,
        kind: QueueKind,
        local_id: &str,
        remote_id: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE pending_queue
            SET pending = 0, synced = 1, remote_id = ?4, updated_at = ?5
            WHERE store = ?1 AND kind = ?2 AND local_id = ?3
            "#,
        )
        .bind(store)
        .bind(kind.as_str())
        .bind(local_id)
        .bind(remote_id)
        .bind(encode_time(Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PendingEntry", local_id));
        }

        debug!(local_id = %local_id, remote_id = %remote_id, "Marked entry synced");
        Ok(())
    }

    /// Flags the entry for deletion on the next replay.
    pub async fn mark_deleted(&self, store: &str, kind: QueueKind, local_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE pending_queue
            SET deleted = 1, updated_at = ?4
            WHERE store = ?1 AND kind = ?2 AND local_id = ?3
            "#,
        )
        .bind(store)
        .bind(kind.as_str())
        .bind(local_id)
        .bind(encode_time(Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PendingEntry", local_id));
        }
        Ok(())
    }

    /// Applies a shallow JSON patch to the queued record and flags it
    /// edited.
    ///
    /// Runs in a transaction so a concurrent edit can't be lost between the
    /// read and the write.
    pub async fn mark_edited(
        &self,
        store: &str,
        kind: QueueKind,
        local_id: &str,
        patch: &Value,
    ) -> DbResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let raw: Option<String> = sqlx::query_scalar(
            "SELECT record FROM pending_queue WHERE store = ?1 AND kind = ?2 AND local_id = ?3",
        )
        .bind(store)
        .bind(kind.as_str())
        .bind(local_id)
        .fetch_optional(&mut *tx)
        .await?;

        let raw = raw.ok_or_else(|| DbError::not_found("PendingEntry", local_id))?;
        let mut record: Value = serde_json::from_str(&raw)?;
        merge_patch(&mut record, patch);

        sqlx::query(
            r#"
            UPDATE pending_queue
            SET record = ?4, edited = 1, updated_at = ?5
            WHERE store = ?1 AND kind = ?2 AND local_id = ?3
            "#,
        )
        .bind(store)
        .bind(kind.as_str())
        .bind(local_id)
        .bind(serde_json::to_string(&record)?)
        .bind(encode_time(Utc::now()))
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(local_id = %local_id, "Patched queued record");
        Ok(())
    }

    /// Removes an entry. Returns false if it was already gone.
    pub async fn remove(&self, store: &str, kind: QueueKind, local_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "DELETE FROM pending_queue WHERE store = ?1 AND kind = ?2 AND local_id = ?3",
        )
        .bind(store)
        .bind(kind.as_str())
        .bind(local_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of entries in the store's queue.
    pub async fn count(&self, store: &str, kind: QueueKind) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pending_queue WHERE store = ?1 AND kind = ?2")
                .bind(store)
                .bind(kind.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
