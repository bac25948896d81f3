//! # Document Repository
//!
//! Collections of versioned JSON documents. Backs the SQLite flavour of the
//! remote store so a single machine (or a shared file) can play the role of
//! the hosted document database.
//!
//! ## Versioning
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert()                 version = 1                                  │
//! │  update(expected: None)   version += 1       (last write wins)         │
//! │  update(expected: Some(v))                                              │
//! │     stored == v  ──►  patch applied, version = v + 1                   │
//! │     stored != v  ──►  DbError::VersionConflict, nothing written        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Filtering
//! `find` compares top-level fields with `json_extract`. Only scalar values
//! are supported; field names are restricted to `[A-Za-z0-9_]` since they
//! are spliced into the JSON path.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use super::{decode_time, encode_time, merge_patch};
use crate::error::{DbError, DbResult};
use banz_core::new_id;

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub collection: String,
    pub id: String,
    pub body: Value,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    collection: String,
    id: String,
    body: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<DocumentRow> for Document {
    type Error = DbError;

    fn try_from(row: DocumentRow) -> DbResult<Self> {
        Ok(Document {
            collection: row.collection,
            id: row.id,
            body: serde_json::from_str(&row.body)?,
            version: row.version,
            created_at: decode_time(&row.created_at)?,
            updated_at: decode_time(&row.updated_at)?,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT collection, id, body, version, created_at, updated_at FROM documents";

fn valid_field(field: &str) -> bool {
    !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Repository for versioned JSON documents.
///
/// ## Usage
/// ```rust,ignore
/// let docs = db.documents();
/// let doc = docs.insert("vendas", None, &serde_json::to_value(&sale)?).await?;
///
/// let same = docs
///     .find("vendas", &[("correlation_id", json!(correlation))])
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
}

impl DocumentRepository {
    /// Creates a new DocumentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DocumentRepository { pool }
    }

    /// Inserts a document at version 1. A fresh id is generated when none
    /// is given.
    pub async fn insert(&self, collection: &str, id: Option<&str>, body: &Value) -> DbResult<Document> {
        let id = id.map(str::to_string).unwrap_or_else(new_id);
        let now = Utc::now();
        let raw = serde_json::to_string(body)?;

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body, version, created_at, updated_at)
            VALUES (?1, ?2, ?3, 1, ?4, ?4)
            "#,
        )
        .bind(collection)
        .bind(&id)
        .bind(&raw)
        .bind(encode_time(now))
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate(collection, id.clone()),
            other => other,
        })?;

        debug!(collection = %collection, id = %id, "Document inserted");

        Ok(Document {
            collection: collection.to_string(),
            id,
            body: body.clone(),
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get(&self, collection: &str, id: &str) -> DbResult<Option<Document>> {
        let sql = format!("{} WHERE collection = ?1 AND id = ?2", SELECT_COLUMNS);
        let row: Option<DocumentRow> = sqlx::query_as(&sql)
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Document::try_from).transpose()
    }

    /// Every document of a collection, in insertion order.
    pub async fn list(&self, collection: &str) -> DbResult<Vec<Document>> {
        self.find(collection, &[]).await
    }

    /// Documents whose top-level fields equal the given scalar values.
    ///
    /// `Value::Null` matches a missing or null field.
    pub async fn find(&self, collection: &str, filters: &[(&str, Value)]) -> DbResult<Vec<Document>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("{} WHERE collection = ", SELECT_COLUMNS));
        qb.push_bind(collection.to_string());

        for (field, value) in filters {
            if !valid_field(field) {
                return Err(DbError::QueryFailed(format!("invalid filter field '{}'", field)));
            }
            qb.push(format!(" AND json_extract(body, '$.{}')", field));

            match value {
                Value::Null => {
                    qb.push(" IS NULL");
                }
                Value::Bool(b) => {
                    qb.push(" = ");
                    qb.push_bind(i64::from(*b));
                }
                Value::Number(n) => {
                    qb.push(" = ");
                    match n.as_i64() {
                        Some(i) => qb.push_bind(i),
                        None => qb.push_bind(n.as_f64().unwrap_or_default()),
                    };
                }
                Value::String(s) => {
                    qb.push(" = ");
                    qb.push_bind(s.clone());
                }
                Value::Array(_) | Value::Object(_) => {
                    return Err(DbError::QueryFailed(format!(
                        "filter on '{}' must be a scalar",
                        field
                    )));
                }
            }
        }

        qb.push(" ORDER BY created_at ASC, rowid ASC");

        let rows: Vec<DocumentRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Document::try_from).collect()
    }

    /// Applies a shallow patch and bumps the version.
    ///
    /// ## Errors
    /// - `NotFound` if the document doesn't exist
    /// - `VersionConflict` if `expected_version` is stale
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: &Value,
        expected_version: Option<i64>,
    ) -> DbResult<Document> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let sql = format!("{} WHERE collection = ?1 AND id = ?2", SELECT_COLUMNS);
        let row: Option<DocumentRow> = sqlx::query_as(&sql)
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let mut doc = match row {
            Some(row) => Document::try_from(row)?,
            None => return Err(DbError::not_found(collection, id)),
        };

        if let Some(expected) = expected_version {
            if doc.version != expected {
                return Err(DbError::VersionConflict {
                    entity: collection.to_string(),
                    id: id.to_string(),
                    expected,
                    actual: doc.version,
                });
            }
        }

        merge_patch(&mut doc.body, patch);
        doc.version += 1;
        doc.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE documents SET body = ?3, version = ?4, updated_at = ?5
            WHERE collection = ?1 AND id = ?2
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(serde_json::to_string(&doc.body)?)
        .bind(doc.version)
        .bind(encode_time(doc.updated_at))
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(collection = %collection, id = %id, version = doc.version, "Document updated");
        Ok(doc)
    }

    /// Deletes a document. Returns false if it didn't exist.
    pub async fn delete(&self, collection: &str, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ?1 AND id = ?2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        debug!(collection = %collection, id = %id, deleted = result.rows_affected() > 0, "Document delete");
        Ok(result.rows_affected() > 0)
    }

    /// Names of collections holding at least one document.
    pub async fn collections(&self) -> DbResult<Vec<String>> {
        let names = sqlx::query_scalar("SELECT DISTINCT collection FROM documents ORDER BY collection")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    pub async fn count(&self, collection: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?1")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use serde_json::json;

    async fn repo() -> DocumentRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().documents()
    }

    #[tokio::test]
    async fn test_insert_get_delete() {
        let docs = repo().await;

        let doc = docs
            .insert("lojas", None, &json!({"name": "Banca Socorro"}))
            .await
            .unwrap();
        assert_eq!(doc.version, 1);

        let got = docs.get("lojas", &doc.id).await.unwrap().unwrap();
        assert_eq!(got.body["name"], "Banca Socorro");

        assert!(docs.delete("lojas", &doc.id).await.unwrap());
        assert!(docs.get("lojas", &doc.id).await.unwrap().is_none());
        assert!(!docs.delete("lojas", &doc.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_with_existing_id_is_duplicate() {
        let docs = repo().await;
        docs.insert("lojas", Some("s1"), &json!({})).await.unwrap();
        let err = docs.insert("lojas", Some("s1"), &json!({})).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { value, .. } if value == "s1"));
    }

    #[tokio::test]
    async fn test_find_by_scalar_fields() {
        let docs = repo().await;
        docs.insert("produtos", None, &json!({"store": "Socorro", "name": "Caderno", "quantity": 10}))
            .await
            .unwrap();
        docs.insert("produtos", None, &json!({"store": "Centro", "name": "Caderno", "quantity": 4}))
            .await
            .unwrap();
        docs.insert("produtos", None, &json!({"store": "Socorro", "name": "Caneta", "legacy": true}))
            .await
            .unwrap();

        let found = docs
            .find("produtos", &[("store", json!("Socorro")), ("name", json!("Caderno"))])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].body["quantity"], 10);

        let by_number = docs.find("produtos", &[("quantity", json!(4))]).await.unwrap();
        assert_eq!(by_number.len(), 1);

        let by_bool = docs.find("produtos", &[("legacy", json!(true))]).await.unwrap();
        assert_eq!(by_bool.len(), 1);

        let missing = docs.find("produtos", &[("legacy", Value::Null)]).await.unwrap();
        assert_eq!(missing.len(), 2);
    }

    #[tokio::test]
    async fn test_find_rejects_unsafe_fields() {
        let docs = repo().await;
        assert!(docs.find("produtos", &[("name') OR 1=1 --", json!("x"))]).await.is_err());
        assert!(docs.find("produtos", &[("items", json!([1]))]).await.is_err());
    }

    #[tokio::test]
    async fn test_update_with_expected_version() {
        let docs = repo().await;
        let doc = docs
            .insert("produtos", None, &json!({"name": "Caderno", "quantity": 10}))
            .await
            .unwrap();

        let updated = docs
            .update("produtos", &doc.id, &json!({"quantity": 8}), Some(1))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.body, json!({"name": "Caderno", "quantity": 8}));

        let err = docs
            .update("produtos", &doc.id, &json!({"quantity": 7}), Some(1))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let stored = docs.get("produtos", &doc.id).await.unwrap().unwrap();
        assert_eq!(stored.body["quantity"], 8);

        let forced = docs
            .update("produtos", &doc.id, &json!({"quantity": 7}), None)
            .await
            .unwrap();
        assert_eq!(forced.version, 3);
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let docs = repo().await;
        let err = docs
            .update("produtos", "ghost", &json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_and_collections() {
        let docs = repo().await;
        docs.insert("vendas", Some("a"), &json!({"n": 1})).await.unwrap();
        docs.insert("vendas", Some("b"), &json!({"n": 2})).await.unwrap();
        docs.insert("logs", None, &json!({})).await.unwrap();

        let ids: Vec<_> = docs.list("vendas").await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(docs.count("vendas").await.unwrap(), 2);
        assert_eq!(docs.collections().await.unwrap(), vec!["logs", "vendas"]);
    }
}
