//! # In-Memory Remote Store
//!
//! Deterministic remote store for tests and demos. Reachability can be
//! switched off and writes to chosen collections can be made to fail.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use banz_core::new_id;

use super::{Collection, Filter, RemoteDoc, RemoteStore, Subscription, WatcherRegistry};
use crate::error::{SyncError, SyncResult};

/// Remote store held in process memory.
///
/// ## Usage
/// ```rust,ignore
/// let remote = Arc::new(MemoryRemoteStore::new());
/// remote.set_available(false);               // every call → RemoteUnavailable
/// remote.fail_writes(Collection::Logs).await; // audit writes → RemoteWriteFailure
/// ```
pub struct MemoryRemoteStore {
    collections: RwLock<HashMap<Collection, Vec<RemoteDoc>>>,
    available: AtomicBool,
    failing: RwLock<HashSet<Collection>>,
    watchers: WatcherRegistry,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        MemoryRemoteStore {
            collections: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            failing: RwLock::new(HashSet::new()),
            watchers: WatcherRegistry::default(),
        }
    }

    /// Simulates losing or regaining the connection.
    pub fn set_available(&self, available: bool) {
        debug!(available, "Memory remote availability changed");
        self.available.store(available, Ordering::SeqCst);
    }

    /// Makes every write to `collection` fail.
    pub async fn fail_writes(&self, collection: Collection) {
        self.failing.write().await.insert(collection);
    }

    pub async fn clear_failures(&self) {
        self.failing.write().await.clear();
    }

    /// Number of documents in a collection, bypassing availability.
    pub async fn len(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .await
            .get(&collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn ensure_available(&self) -> SyncResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::RemoteUnavailable)
        }
    }

    async fn ensure_writable(&self, collection: Collection) -> SyncResult<()> {
        self.ensure_available()?;
        if self.failing.read().await.contains(&collection) {
            warn!(collection = %collection, "Injected write failure");
            return Err(SyncError::RemoteWriteFailure(format!(
                "write to {} rejected",
                collection
            )));
        }
        Ok(())
    }

    async fn publish(&self, collection: Collection) {
        if !self.watchers.is_watched(collection).await {
            return;
        }
        let docs = self
            .collections
            .read()
            .await
            .get(&collection)
            .cloned()
            .unwrap_or_default();
        self.watchers.notify(collection, &docs).await;
    }
}

fn merge(target: &mut Value, patch: Value) {
    match (target.as_object_mut(), patch) {
        (Some(target), Value::Object(patch)) => {
            for (key, value) in patch {
                target.insert(key, value);
            }
        }
        (_, patch) => *target = patch,
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn create(&self, collection: Collection, data: Value) -> SyncResult<RemoteDoc> {
        self.ensure_writable(collection).await?;

        let doc = RemoteDoc {
            id: new_id(),
            version: 1,
            data,
        };
        self.collections
            .write()
            .await
            .entry(collection)
            .or_default()
            .push(doc.clone());

        self.publish(collection).await;
        Ok(doc)
    }

    async fn get(&self, collection: Collection, id: &str) -> SyncResult<Option<RemoteDoc>> {
        self.ensure_available()?;
        Ok(self
            .collections
            .read()
            .await
            .get(&collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id).cloned()))
    }

    async fn query(&self, collection: Collection, filter: &Filter) -> SyncResult<Vec<RemoteDoc>> {
        self.ensure_available()?;
        Ok(self
            .collections
            .read()
            .await
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| filter.matches(&d.data))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
        expected_version: Option<i64>,
    ) -> SyncResult<RemoteDoc> {
        self.ensure_writable(collection).await?;

        let updated = {
            let mut collections = self.collections.write().await;
            let doc = collections
                .get_mut(&collection)
                .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
                .ok_or_else(|| SyncError::not_found(collection.name(), id))?;

            if let Some(expected) = expected_version {
                if doc.version != expected {
                    return Err(SyncError::ConflictDetected {
                        entity: collection.name().to_string(),
                        id: id.to_string(),
                        expected,
                        actual: doc.version,
                    });
                }
            }

            merge(&mut doc.data, patch);
            doc.version += 1;
            doc.clone()
        };

        self.publish(collection).await;
        Ok(updated)
    }

    async fn delete(&self, collection: Collection, id: &str) -> SyncResult<bool> {
        self.ensure_writable(collection).await?;

        let removed = {
            let mut collections = self.collections.write().await;
            match collections.get_mut(&collection) {
                Some(docs) => {
                    let before = docs.len();
                    docs.retain(|d| d.id != id);
                    docs.len() < before
                }
                None => false,
            }
        };

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
        self.available.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
