//! # Remote Store Adapter
//!
//! The hosted document database every device writes to, reduced to the
//! six operations the workflows need.
//!
//! ## Interface
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        RemoteStore (trait)                              │
//! │                                                                         │
//! │  create(collection, data)                    → RemoteDoc (id, v1)      │
//! │  get(collection, id)                         → Option<RemoteDoc>       │
//! │  query(collection, filter)                   → Vec<RemoteDoc>          │
//! │  update(collection, id, patch, expected_v)   → RemoteDoc (v + 1)       │
//! │  delete(collection, id)                      → bool                    │
//! │  subscribe(collection, filter)               → Subscription            │
//! │                                                                         │
//! │  ┌────────────────────────┐      ┌─────────────────────────────────┐   │
//! │  │  MemoryRemoteStore     │      │  SqliteRemoteStore              │   │
//! │  │  tests, availability   │      │  DocumentRepository on a        │   │
//! │  │  and failure injection │      │  shared SQLite file             │   │
//! │  └────────────────────────┘      └─────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Typed Access
//! Domain records implement [`RemoteRecord`], which ties them to a
//! [`Collection`]. The `id` and `version` of a record are owned by the
//! document, so [`encode`] strips them before writing and [`RemoteDoc::decode`]
//! puts them back.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryRemoteStore;
pub use sqlite::SqliteRemoteStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use banz_core::{
    AuditEntry, Closure, Employee, Product, Sale, StockEntry, StockMovement, Store, Transfer,
};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Collections
// =============================================================================

/// Remote collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Stores,
    Employees,
    Products,
    Sales,
    Closures,
    Logs,
    Transfers,
    StockEntries,
    StockMovements,
}

impl Collection {
    pub const ALL: [Collection; 9] = [
        Collection::Stores,
        Collection::Employees,
        Collection::Products,
        Collection::Sales,
        Collection::Closures,
        Collection::Logs,
        Collection::Transfers,
        Collection::StockEntries,
        Collection::StockMovements,
    ];

    /// Collection name in the document store.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Stores => "lojas",
            Collection::Employees => "funcionarios",
            Collection::Products => "produtos",
            Collection::Sales => "vendas",
            Collection::Closures => "fechamentos",
            Collection::Logs => "logs",
            Collection::Transfers => "transferencias",
            Collection::StockEntries => "entradas",
            Collection::StockMovements => "movimentacoes_estoque",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Filter
// =============================================================================

/// Conjunction of equality clauses on top-level fields.
///
/// ## Example
/// ```rust,ignore
/// let filter = Filter::all()
///     .eq("store", "Banca Socorro")
///     .eq("name", "Caderno");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every document.
    pub fn all() -> Self {
        Filter::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    /// Evaluates the filter against a document body. `Null` matches a
    /// missing field.
    pub fn matches(&self, data: &Value) -> bool {
        self.clauses.iter().all(|(field, expected)| {
            let actual = data.get(field.as_str()).unwrap_or(&Value::Null);
            actual == expected
        })
    }
}

// =============================================================================
// Documents
// =============================================================================

/// A document as returned by the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDoc {
    pub id: String,
    pub version: i64,
    pub data: Value,
}

impl RemoteDoc {
    /// Decodes the document into a domain record carrying the document's
    /// id and version.
    pub fn decode<T: RemoteRecord>(&self) -> SyncResult<T> {
        let mut data = self.data.clone();
        if let Some(obj) = data.as_object_mut() {
            obj.insert("id".to_string(), T::id_value(&self.id));
            obj.insert("version".to_string(), json!(self.version));
        }
        Ok(serde_json::from_value(data)?)
    }

    /// Document body with its id, as written to backups.
    pub fn to_export(&self) -> Value {
        let mut data = self.data.clone();
        if let Some(obj) = data.as_object_mut() {
            obj.insert("id".to_string(), json!(self.id));
        }
        data
    }
}

/// A domain record stored in a remote collection.
pub trait RemoteRecord: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;

    /// JSON form of the record's `id` field for a document id.
    fn id_value(id: &str) -> Value {
        json!(id)
    }
}

impl RemoteRecord for Sale {
    const COLLECTION: Collection = Collection::Sales;

    fn id_value(id: &str) -> Value {
        json!({"space": "remote", "value": id})
    }
}

impl RemoteRecord for Product {
    const COLLECTION: Collection = Collection::Products;
}

impl RemoteRecord for Closure {
    const COLLECTION: Collection = Collection::Closures;
}

impl RemoteRecord for Store {
    const COLLECTION: Collection = Collection::Stores;
}

impl RemoteRecord for Employee {
    const COLLECTION: Collection = Collection::Employees;
}

impl RemoteRecord for AuditEntry {
    const COLLECTION: Collection = Collection::Logs;
}

impl RemoteRecord for Transfer {
    const COLLECTION: Collection = Collection::Transfers;
}

impl RemoteRecord for StockEntry {
    const COLLECTION: Collection = Collection::StockEntries;
}

impl RemoteRecord for StockMovement {
    const COLLECTION: Collection = Collection::StockMovements;
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Live query: the current snapshot first, then a fresh snapshot after
/// every change to the collection. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Vec<RemoteDoc>>,
}

impl Subscription {
    /// Waits for the next snapshot. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Vec<RemoteDoc>> {
        self.rx.recv().await
    }

    /// Returns a snapshot if one is already waiting.
    pub fn try_next(&mut self) -> Option<Vec<RemoteDoc>> {
        self.rx.try_recv().ok()
    }
}

struct Watcher {
    collection: Collection,
    filter: Filter,
    tx: mpsc::UnboundedSender<Vec<RemoteDoc>>,
}

/// Subscribers shared by the store implementations.
#[derive(Default)]
pub(crate) struct WatcherRegistry {
    watchers: Mutex<Vec<Watcher>>,
}

impl WatcherRegistry {
    /// Registers a watcher and delivers its initial snapshot.
    pub(crate) async fn register(
        &self,
        collection: Collection,
        filter: Filter,
        initial: Vec<RemoteDoc>,
    ) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so the first send can't fail
        let _ = tx.send(initial);
        self.watchers.lock().await.push(Watcher {
            collection,
            filter,
            tx,
        });
        Subscription { rx }
    }

    pub(crate) async fn is_watched(&self, collection: Collection) -> bool {
        self.watchers
            .lock()
            .await
            .iter()
            .any(|w| w.collection == collection && !w.tx.is_closed())
    }

    /// Sends each watcher of `collection` its filtered view of `docs` and
    /// forgets watchers whose subscription was dropped.
    pub(crate) async fn notify(&self, collection: Collection, docs: &[RemoteDoc]) {
        let mut watchers = self.watchers.lock().await;
        watchers.retain(|w| {
            if w.collection != collection {
                return !w.tx.is_closed();
            }
            let snapshot: Vec<RemoteDoc> = docs
                .iter()
                .filter(|d| w.filter.matches(&d.data))
                .cloned()
                .collect();
            w.tx.send(snapshot).is_ok()
        });
        debug!(collection = %collection, watchers = watchers.len(), "Snapshots delivered");
    }
}

// =============================================================================
// Remote Store Trait
// =============================================================================

/// The remote document store.
///
/// ## Errors
/// - `RemoteUnavailable` when the store can't be reached
/// - `RemoteWriteFailure` when a write was rejected
/// - `ConflictDetected` when `expected_version` is stale
/// - `NotFound` when updating a missing document
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn create(&self, collection: Collection, data: Value) -> SyncResult<RemoteDoc>;

    async fn get(&self, collection: Collection, id: &str) -> SyncResult<Option<RemoteDoc>>;

    /// Matching documents in insertion order.
    async fn query(&self, collection: Collection, filter: &Filter) -> SyncResult<Vec<RemoteDoc>>;

    /// Shallow-merges `patch` into the document. With `expected_version`,
    /// the write only happens if the stored version still matches.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
        expected_version: Option<i64>,
    ) -> SyncResult<RemoteDoc>;

    /// Returns false if the document didn't exist.
    async fn delete(&self, collection: Collection, id: &str) -> SyncResult<bool>;

    async fn subscribe(&self, collection: Collection, filter: Filter) -> SyncResult<Subscription>;

    /// Cheap reachability probe.
    async fn is_available(&self) -> bool;
}

// =============================================================================
// Typed Helpers
// =============================================================================

/// Record body without the document-owned `id` and `version` fields.
pub fn encode<T: RemoteRecord>(record: &T) -> SyncResult<Value> {
    let mut data = serde_json::to_value(record)?;
    if let Some(obj) = data.as_object_mut() {
        obj.remove("id");
        obj.remove("version");
    }
    Ok(data)
}

pub fn decode_all<T: RemoteRecord>(docs: &[RemoteDoc]) -> SyncResult<Vec<T>> {
    docs.iter().map(RemoteDoc::decode).collect()
}

/// Creates a document from a record and returns the stored record.
pub async fn insert<T: RemoteRecord>(remote: &dyn RemoteStore, record: &T) -> SyncResult<T> {
    let doc = remote.create(T::COLLECTION, encode(record)?).await?;
    doc.decode()
}

pub async fn fetch<T: RemoteRecord>(remote: &dyn RemoteStore, id: &str) -> SyncResult<Option<T>> {
    remote
        .get(T::COLLECTION, id)
        .await?
        .map(|doc| doc.decode())
        .transpose()
}

pub async fn find<T: RemoteRecord>(remote: &dyn RemoteStore, filter: &Filter) -> SyncResult<Vec<T>> {
    let docs = remote.query(T::COLLECTION, filter).await?;
    decode_all(&docs)
}

/// Overwrites every field of the document with the record's.
pub async fn replace<T: RemoteRecord>(
    remote: &dyn RemoteStore,
    id: &str,
    record: &T,
    expected_version: Option<i64>,
) -> SyncResult<T> {
    let doc = remote
        .update(T::COLLECTION, id, encode(record)?, expected_version)
        .await?;
    doc.decode()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use banz_core::{LineItem, Money, Payment, PaymentMethod, RecordId};
    use chrono::Utc;

    #[test]
    fn test_collection_names() {
        assert_eq!(Collection::Sales.name(), "vendas");
        assert_eq!(Collection::Closures.to_string(), "fechamentos");
        assert_eq!(Collection::ALL.len(), 9);
    }

    #[test]
    fn test_filter_matches() {
        let doc = json!({"store": "Socorro", "name": "Caderno"});
        assert!(Filter::all().matches(&doc));
        assert!(Filter::all().eq("store", "Socorro").matches(&doc));
        assert!(!Filter::all().eq("store", "Centro").matches(&doc));
        assert!(Filter::all().eq("correlation_id", Value::Null).matches(&doc));
    }

    #[test]
    fn test_sale_encode_decode_moves_identity_to_document() {
        let sale = Sale {
            id: RecordId::Local("l1".to_string()),
            correlation_id: Some("c1".to_string()),
            store: "Socorro".to_string(),
            seller: "ryan".to_string(),
            items: vec![LineItem::new("Caderno", 1)],
            payments: vec![Payment::new(PaymentMethod::Pix, Money::from_cents(800))],
            note: None,
            timestamp: Utc::now(),
            below_minimum_alert: false,
            version: 0,
        };

        let data = encode(&sale).unwrap();
        assert!(data.get("id").is_none());
        assert!(data.get("version").is_none());

        let doc = RemoteDoc {
            id: "r1".to_string(),
            version: 3,
            data,
        };
        let decoded: Sale = doc.decode().unwrap();
        assert_eq!(decoded.id, RecordId::Remote("r1".to_string()));
        assert_eq!(decoded.version, 3);
        assert_eq!(decoded.correlation_id.as_deref(), Some("c1"));
        assert_eq!(doc.to_export()["id"], "r1");
    }
}
