//! # Session Repository
//!
//! Persists the selected store and the logged-in operator across restarts.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use super::encode_time;
use crate::error::DbResult;

const STORE_KEY: &str = "store";
const OPERATOR_KEY: &str = "operator";

/// What the session table currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredSession {
    pub store: Option<String>,
    pub operator: Option<String>,
}

/// Repository for the persisted session.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Creates a new SessionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    pub async fn get(&self) -> DbResult<StoredSession> {
        Ok(StoredSession {
            store: self.read(STORE_KEY).await?,
            operator: self.read(OPERATOR_KEY).await?,
        })
    }

    pub async fn set_store(&self, store: &str) -> DbResult<()> {
        self.write(STORE_KEY, store).await
    }

    pub async fn set_operator(&self, operator: &str) -> DbResult<()> {
        self.write(OPERATOR_KEY, operator).await
    }

    /// Forgets both store and operator.
    pub async fn clear(&self) -> DbResult<()> {
        sqlx::query("DELETE FROM session")
            .execute(&self.pool)
            .await?;
        debug!("Session cleared");
        Ok(())
    }

    async fn read(&self, key: &str) -> DbResult<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM session WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn write(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO session (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(encode_time(Utc::now()))
        .execute(&self.pool)
        .await?;
        debug!(key = %key, "Session updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_session_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let session = db.session();

        assert_eq!(session.get().await.unwrap(), StoredSession::default());

        session.set_store("Banca Socorro").await.unwrap();
        session.set_operator("ryan").await.unwrap();
        session.set_operator("ana").await.unwrap();

        let stored = session.get().await.unwrap();
        assert_eq!(stored.store.as_deref(), Some("Banca Socorro"));
        assert_eq!(stored.operator.as_deref(), Some("ana"));

        session.clear().await.unwrap();
        assert_eq!(session.get().await.unwrap(), StoredSession::default());
    }
}
