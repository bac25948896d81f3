//! # SQLite Remote Store
//!
//! Remote store backed by a SQLite file that every terminal of a shop
//! points at. Documents live in the `documents` table managed by
//! [`DocumentRepository`]; versions give compare-and-set semantics.
//!
//! Subscriptions only observe writes made through this process.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use banz_db::{Database, DbError, Document, DocumentRepository};

use super::{Collection, Filter, RemoteDoc, RemoteStore, Subscription, WatcherRegistry};
use crate::error::{SyncError, SyncResult};

/// Remote store on a shared SQLite database.
pub struct SqliteRemoteStore {
    db: Database,
    documents: DocumentRepository,
    watchers: WatcherRegistry,
}

impl SqliteRemoteStore {
    pub fn new(db: Database) -> Self {
        let documents = db.documents();
        SqliteRemoteStore {
            db,
            documents,
            watchers: WatcherRegistry::default(),
        }
    }

    async fn publish(&self, collection: Collection) {
        if !self.watchers.is_watched(collection).await {
            return;
        }
        match self.documents.list(collection.name()).await {
            Ok(docs) => {
                let docs: Vec<RemoteDoc> = docs.into_iter().map(to_remote).collect();
                self.watchers.notify(collection, &docs).await;
            }
            Err(e) => warn!(collection = %collection, error = %e, "Snapshot refresh failed"),
        }
    }
}

fn to_remote(doc: Document) -> RemoteDoc {
    RemoteDoc {
        id: doc.id,
        version: doc.version,
        data: doc.body,
    }
}

/// Keeps the errors callers act on and folds the rest into a write failure.
fn write_error(err: DbError) -> SyncError {
    match err {
        DbError::NotFound { .. } | DbError::VersionConflict { .. } => err.into(),
        other => SyncError::RemoteWriteFailure(other.to_string()),
    }
}

#[async_trait]
impl RemoteStore for SqliteRemoteStore {
    async fn create(&self, collection: Collection, data: Value) -> SyncResult<RemoteDoc> {
        let doc = self
            .documents
            .insert(collection.name(), None, &data)
            .await
            .map_err(write_error)?;
        debug!(collection = %collection, id = %doc.id, "Remote document created");

        self.publish(collection).await;
        Ok(to_remote(doc))
    }

    async fn get(&self, collection: Collection, id: &str) -> SyncResult<Option<RemoteDoc>> {
        Ok(self
            .documents
            .get(collection.name(), id)
            .await?
            .map(to_remote))
    }

    async fn query(&self, collection: Collection, filter: &Filter) -> SyncResult<Vec<RemoteDoc>> {
        let clauses: Vec<(&str, Value)> = filter
            .clauses()
            .iter()
            .map(|(field, value)| (field.as_str(), value.clone()))
            .collect();

        let docs = self.documents.find(collection.name(), &clauses).await?;
        Ok(docs.into_iter().map(to_remote).collect())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
        expected_version: Option<i64>,
    ) -> SyncResult<RemoteDoc> {
        let doc = self
            .documents
            .update(collection.name(), id, &patch, expected_version)
            .await
            .map_err(write_error)?;

        self.publish(collection).await;
        Ok(to_remote(doc))
    }

    async fn delete(&self, collection: Collection, id: &str) -> SyncResult<bool> {
        let removed = self
            .documents
            .delete(collection.name(), id)
            .await
            .map_err(write_error)?;

        if removed {
            self.publish(collection).await;
        }
        Ok(removed)
    }

    async fn subscribe(&self, collection: Collection, filter: Filter) -> SyncResult<Subscription> {
        let initial = self.query(collection, &filter).await?;
        Ok(self.watchers.register(collection, filter, initial).await)
    }

    async fn is_available(&self) -> bool {
        self.db.health_check().await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
