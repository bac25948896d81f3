//! # Mirror Cache Repository
//!
//! Last-known-good copy of each store's lists, shown when the remote store
//! is unreachable and rewritten after every confirmed snapshot.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;
use tracing::debug;

use super::encode_time;
use crate::error::DbResult;

/// Which list a mirror entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorKind {
    Sales,
    Products,
    Stores,
}

impl MirrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorKind::Sales => "sales",
            MirrorKind::Products => "products",
            MirrorKind::Stores => "stores",
        }
    }
}

impl fmt::Display for MirrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository for the mirror cache.
#[derive(Debug, Clone)]
pub struct MirrorCacheRepository {
    pool: SqlitePool,
}

impl MirrorCacheRepository {
    /// Creates a new MirrorCacheRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MirrorCacheRepository { pool }
    }

    /// Cached list, empty if nothing was ever cached.
    pub async fn get<T: DeserializeOwned>(&self, store: &str, kind: MirrorKind) -> DbResult<Vec<T>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT records FROM mirror_cache WHERE store = ?1 AND kind = ?2")
                .bind(store)
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replaces the cached list.
    pub async fn set<T: Serialize>(&self, store: &str, kind: MirrorKind, records: &[T]) -> DbResult<()> {
        let raw = serde_json::to_string(records)?;

        sqlx::query(
            r#"
            INSERT INTO mirror_cache (store, kind, records, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (store, kind) DO UPDATE SET
                records = excluded.records,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(store)
        .bind(kind.as_str())
        .bind(&raw)
        .bind(encode_time(Utc::now()))
        .execute(&self.pool)
        .await?;

        debug!(store = %store, kind = %kind, count = records.len(), "Mirror updated");
        Ok(())
    }

    /// Drops every cached list of a store.
    pub async fn clear(&self, store: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM mirror_cache WHERE store = ?1")
            .bind(store)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_mirror_set_get_clear() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mirror = db.mirror();

        let empty: Vec<String> = mirror.get("Socorro", MirrorKind::Sales).await.unwrap();
        assert!(empty.is_empty());

        mirror
            .set("Socorro", MirrorKind::Sales, &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        mirror
            .set("Socorro", MirrorKind::Sales, &["c".to_string()])
            .await
            .unwrap();
        mirror
            .set("Centro", MirrorKind::Sales, &["z".to_string()])
            .await
            .unwrap();

        let got: Vec<String> = mirror.get("Socorro", MirrorKind::Sales).await.unwrap();
        assert_eq!(got, vec!["c".to_string()]);

        mirror.clear("Socorro").await.unwrap();
        let got: Vec<String> = mirror.get("Socorro", MirrorKind::Sales).await.unwrap();
        assert!(got.is_empty());
        let other: Vec<String> = mirror.get("Centro", MirrorKind::Sales).await.unwrap();
        assert_eq!(other.len(), 1);
    }
}
