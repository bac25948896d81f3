//! # Inventory
//!
//! Product catalogue and stock levels of every store.
//!
//! ## Stock Adjustment
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  adjust_stock(store, name, delta)                                       │
//! │                                                                         │
//! │   ┌──► read product (quantity q, version v)                             │
//! │   │         │                                                           │
//! │   │         ▼                                                           │
//! │   │    update quantity = q + delta  IF version == v                     │
//! │   │         │                                                           │
//! │   │         ├── ok ─────────► refresh mirror, return product            │
//! │   │         │                                                           │
//! │   └─────────┴── conflict (another terminal wrote first), retry          │
//! │                 up to max_version_retries times                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock may go negative: a sale confirmed over a shortfall debits anyway.
//! Transfers are stricter and refuse to move goods a store doesn't have.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use chrono::Utc;

use banz_core::validation::{validate_items, validate_product_draft};
use banz_core::{
    new_id, AuditAction, CoreError, LineItem, MovementKind, PendingEntry, Product, ProductDraft,
    QueueKind, SessionContext, StockEntry, StockMovement, Store, Transfer,
};
use banz_db::{Database, MirrorKind};

use crate::audit::AuditLogger;
use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use crate::remote::{self, Collection, Filter, RemoteStore};
use crate::saga::{Compensation, Saga};

/// How a new product was stored.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductWrite {
    /// Written to the remote store.
    Created(Product),
    /// Kept in the local queue until the next reconnect.
    Queued(Product),
}

impl ProductWrite {
    pub fn product(&self) -> &Product {
        match self {
            ProductWrite::Created(p) | ProductWrite::Queued(p) => p,
        }
    }
}

/// Sums quantities per product name.
fn aggregate(items: &[LineItem]) -> BTreeMap<String, i64> {
    let mut out = BTreeMap::new();
    for item in items {
        *out.entry(item.product_name.clone()).or_insert(0) += item.quantity;
    }
    out
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

#[derive(Clone)]
pub struct InventoryService {
    remote: Arc<dyn RemoteStore>,
    db: Database,
    audit: AuditLogger,
    connectivity: Connectivity,
    max_retries: u32,
}

impl InventoryService {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        db: Database,
        audit: AuditLogger,
        connectivity: Connectivity,
        max_retries: u32,
    ) -> Self {
        InventoryService {
            remote,
            db,
            audit,
            connectivity,
            max_retries: max_retries.max(1),
        }
    }

    async fn require_online(&self) -> SyncResult<()> {
        if self.connectivity.is_online().await {
            Ok(())
        } else {
            Err(SyncError::RemoteUnavailable)
        }
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Products of a store, including ones created offline and not yet
    /// replayed.
    ///
    /// Reads the remote store when online and rewrites the mirror; falls
    /// back to the mirror when offline or when the remote store can't be
    /// reached.
    pub async fn products(&self, store: &str) -> SyncResult<Vec<Product>> {
        let mut products = match self.remote_products(store).await? {
            Some(products) => products,
            None => {
                debug!(store = %store, "Listing products from mirror");
                self.db.mirror().get(store, MirrorKind::Products).await?
            }
        };

        let queued: Vec<PendingEntry<Product>> = self
            .db
            .pending_queue()
            .list_pending(store, QueueKind::Products)
            .await?;
        products.extend(
            queued
                .into_iter()
                .filter(|e| !e.deleted && !e.synced)
                .map(|e| e.record),
        );

        Ok(products)
    }

    async fn remote_products(&self, store: &str) -> SyncResult<Option<Vec<Product>>> {
        if !self.connectivity.is_online().await {
            return Ok(None);
        }
        let filter = Filter::all().eq("store", store);
        match remote::find::<Product>(self.remote.as_ref(), &filter).await {
            Ok(products) => {
                self.cache_products(store, &products).await;
                Ok(Some(products))
            }
            Err(SyncError::RemoteUnavailable) => {
                warn!(store = %store, "Remote store unavailable, using mirror");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn cache_products(&self, store: &str, products: &[Product]) {
        if let Err(e) = self.db.mirror().set(store, MirrorKind::Products, products).await {
            warn!(store = %store, error = %e, "Failed to update product mirror");
        }
    }

    /// Replaces one product in the mirror, leaving the others alone.
    async fn cache_product(&self, product: &Product) {
        let mirror = self.db.mirror();
        let mut cached: Vec<Product> = match mirror.get(&product.store, MirrorKind::Products).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(store = %product.store, error = %e, "Failed to read product mirror");
                return;
            }
        };
        match cached.iter_mut().find(|p| p.id == product.id) {
            Some(slot) => *slot = product.clone(),
            None => cached.push(product.clone()),
        }
        self.cache_products(&product.store, &cached).await;
    }

    /// Looks a product up by name in the remote store.
    pub async fn find_product(&self, store: &str, name: &str) -> SyncResult<Product> {
        let filter = Filter::all().eq("store", store).eq("name", name);
        remote::find::<Product>(self.remote.as_ref(), &filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CoreError::ProductNotFound {
                    store: store.to_string(),
                    name: name.to_string(),
                }
                .into()
            })
    }

    // =========================================================================
    // Stock Levels
    // =========================================================================

    /// Adds `delta` to a product's quantity with compare-and-set.
    ///
    /// ## Errors
    /// - `Core(ProductNotFound)` if the store has no such product
    /// - `ConflictDetected` if every attempt lost against another writer
    pub async fn adjust_stock(&self, store: &str, name: &str, delta: i64) -> SyncResult<Product> {
        let mut last_conflict = None;

        for attempt in 1..=self.max_retries {
            let product = self.find_product(store, name).await?;
            let patch = json!({ "quantity": product.quantity + delta });

            match self
                .remote
                .update(Collection::Products, &product.id, patch, Some(product.version))
                .await
            {
                Ok(doc) => {
                    let updated: Product = doc.decode()?;
                    debug!(
                        store = %store,
                        product = %name,
                        delta,
                        quantity = updated.quantity,
                        "Stock adjusted"
                    );
                    self.cache_product(&updated).await;
                    return Ok(updated);
                }
                Err(e @ SyncError::ConflictDetected { .. }) => {
                    warn!(store = %store, product = %name, attempt, "Stock write lost a race, retrying");
                    last_conflict = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_conflict.unwrap_or_else(|| SyncError::Internal("no stock write attempted".into())))
    }

    /// Takes the items out of a store's stock, one adjustment per product.
    ///
    /// Each successful adjustment records its undo step in `saga`.
    pub async fn debit_items(&self, store: &str, items: &[LineItem], saga: &mut Saga) -> SyncResult<()> {
        for (product, quantity) in aggregate(items) {
            self.adjust_stock(store, &product, -quantity).await?;
            saga.record(Compensation::AdjustStock {
                store: store.to_string(),
                product,
                delta: quantity,
            });
        }
        Ok(())
    }

    /// Puts the items back into a store's stock.
    pub async fn credit_items(&self, store: &str, items: &[LineItem], saga: &mut Saga) -> SyncResult<()> {
        for (product, quantity) in aggregate(items) {
            self.adjust_stock(store, &product, quantity).await?;
            saga.record(Compensation::AdjustStock {
                store: store.to_string(),
                product,
                delta: -quantity,
            });
        }
        Ok(())
    }

    /// Replaces `old` items with `new` ones in a store's stock, writing only
    /// the net change per product.
    pub async fn rebalance_items(
        &self,
        store: &str,
        old: &[LineItem],
        new: &[LineItem],
        saga: &mut Saga,
    ) -> SyncResult<()> {
        let mut deltas = aggregate(old);
        for (product, quantity) in aggregate(new) {
            *deltas.entry(product).or_insert(0) -= quantity;
        }

        for (product, delta) in deltas.into_iter().filter(|(_, d)| *d != 0) {
            self.adjust_stock(store, &product, delta).await?;
            saga.record(Compensation::AdjustStock {
                store: store.to_string(),
                product,
                delta: -delta,
            });
        }
        Ok(())
    }

    /// Total units on hand per store.
    pub async fn stock_totals_by_store(&self) -> SyncResult<BTreeMap<String, i64>> {
        let products: Vec<Product> = remote::find(self.remote.as_ref(), &Filter::all()).await?;
        let mut totals = BTreeMap::new();
        for product in products {
            *totals.entry(product.store).or_insert(0) += product.quantity;
        }
        Ok(totals)
    }

    // =========================================================================
    // Catalogue
    // =========================================================================

    /// Adds a product to the current store.
    ///
    /// Offline, the product is queued and becomes sellable immediately;
    /// the reconciler publishes it on the next reconnect.
    pub async fn create_product(&self, ctx: &SessionContext, draft: &ProductDraft) -> SyncResult<ProductWrite> {
        validate_product_draft(draft)?;

        let existing = self.products(&ctx.store).await?;
        if existing.iter().any(|p| same_name(&p.name, &draft.name)) {
            return Err(SyncError::duplicate("product", draft.name.trim()));
        }

        let product = Product {
            id: new_id(),
            name: draft.name.trim().to_string(),
            quantity: draft.quantity,
            min_price_cents: draft.min_price_cents,
            max_price_cents: draft.max_price_cents,
            store: ctx.store.clone(),
            version: 0,
        };

        if !self.connectivity.is_online().await {
            let entry = PendingEntry::new(product.id.clone(), product.clone());
            self.db
                .pending_queue()
                .enqueue(&ctx.store, QueueKind::Products, &entry)
                .await?;
            info!(store = %ctx.store, product = %product.name, "Product queued offline");
            return Ok(ProductWrite::Queued(product));
        }

        let created = self.publish_product(ctx, &product).await?;
        Ok(ProductWrite::Created(created))
    }

    /// Writes a new product to the remote store with its movement and
    /// audit entry.
    async fn publish_product(&self, ctx: &SessionContext, product: &Product) -> SyncResult<Product> {
        let created = remote::insert(self.remote.as_ref(), product).await?;
        self.cache_product(&created).await;
        self.record_movement(ctx, MovementKind::Added, None, Some(created.clone()))
            .await;
        self.audit
            .record(
                ctx,
                AuditAction::ProductAdded,
                &created.name,
                format!("quantity {}", created.quantity),
            )
            .await;
        info!(store = %ctx.store, product = %created.name, "Product created");
        Ok(created)
    }

    /// Publishes products created offline. Returns how many were written.
    ///
    /// A queued product whose name already exists remotely is dropped
    /// rather than duplicated.
    pub async fn replay_queued_products(&self, ctx: &SessionContext) -> SyncResult<usize> {
        let queue = self.db.pending_queue();
        let entries: Vec<PendingEntry<Product>> =
            queue.list_pending(&ctx.store, QueueKind::Products).await?;

        let mut created = 0;
        for entry in entries {
            if entry.deleted || entry.synced {
                queue.remove(&ctx.store, QueueKind::Products, &entry.local_id).await?;
                continue;
            }

            let filter = Filter::all()
                .eq("store", ctx.store.as_str())
                .eq("name", entry.record.name.as_str());
            let exists = !self.remote.query(Collection::Products, &filter).await?.is_empty();
            if exists {
                warn!(product = %entry.record.name, "Queued product already exists remotely");
            } else {
                self.publish_product(ctx, &entry.record).await?;
                created += 1;
            }
            queue.remove(&ctx.store, QueueKind::Products, &entry.local_id).await?;
        }

        Ok(created)
    }

    /// Changes a product's name, quantity or price range.
    pub async fn edit_product(
        &self,
        ctx: &SessionContext,
        name: &str,
        draft: &ProductDraft,
    ) -> SyncResult<Product> {
        validate_product_draft(draft)?;
        self.require_online().await?;

        let before = self.find_product(&ctx.store, name).await?;
        if !same_name(&before.name, &draft.name) {
            let taken = self
                .products(&ctx.store)
                .await?
                .iter()
                .any(|p| same_name(&p.name, &draft.name));
            if taken {
                return Err(SyncError::duplicate("product", draft.name.trim()));
            }
        }

        let after = Product {
            name: draft.name.trim().to_string(),
            quantity: draft.quantity,
            min_price_cents: draft.min_price_cents,
            max_price_cents: draft.max_price_cents,
            ..before.clone()
        };
        let after = remote::replace(self.remote.as_ref(), &before.id, &after, Some(before.version)).await?;

        self.cache_product(&after).await;
        self.record_movement(ctx, MovementKind::Edited, Some(before.clone()), Some(after.clone()))
            .await;
        self.audit
            .record(
                ctx,
                AuditAction::ProductEdited,
                &after.name,
                format!("quantity {} -> {}", before.quantity, after.quantity),
            )
            .await;

        Ok(after)
    }

    /// Removes a product from the current store.
    pub async fn delete_product(&self, ctx: &SessionContext, name: &str) -> SyncResult<()> {
        self.require_online().await?;

        let product = self.find_product(&ctx.store, name).await?;
        self.remote.delete(Collection::Products, &product.id).await?;

        let remaining: Vec<Product> = self
            .db
            .mirror()
            .get::<Product>(&ctx.store, MirrorKind::Products)
            .await?
            .into_iter()
            .filter(|p| p.id != product.id)
            .collect();
        self.cache_products(&ctx.store, &remaining).await;

        self.record_movement(ctx, MovementKind::Removed, Some(product.clone()), None)
            .await;
        self.audit
            .record(ctx, AuditAction::ProductRemoved, &product.name, "")
            .await;
        info!(store = %ctx.store, product = %product.name, "Product removed");
        Ok(())
    }

    async fn record_movement(
        &self,
        ctx: &SessionContext,
        kind: MovementKind,
        before: Option<Product>,
        after: Option<Product>,
    ) {
        let movement = StockMovement {
            id: String::new(),
            kind,
            before,
            after,
            store: ctx.store.clone(),
            operator: ctx.operator.clone(),
            timestamp: Utc::now(),
        };
        if let Err(e) = remote::insert(self.remote.as_ref(), &movement).await {
            warn!(store = %ctx.store, error = %e, "Stock movement not recorded");
        }
    }

    // =========================================================================
    // Stock Entries & Transfers
    // =========================================================================

    /// Receives goods into the current store. `origin` is `None` for
    /// supplier deliveries.
    ///
    /// Every product must already exist in the store.
    pub async fn stock_entry(
        &self,
        ctx: &SessionContext,
        items: &[LineItem],
        origin: Option<String>,
    ) -> SyncResult<StockEntry> {
        validate_items(items)?;
        self.require_online().await?;

        for name in aggregate(items).keys() {
            self.find_product(&ctx.store, name).await?;
        }

        let mut saga = Saga::new("stock_entry");
        let result = self.apply_stock_entry(ctx, items, origin, &mut saga).await;
        match result {
            Ok(entry) => {
                self.audit
                    .record(
                        ctx,
                        AuditAction::StockEntry,
                        &ctx.store,
                        format!("{} item(s)", items.len()),
                    )
                    .await;
                Ok(entry)
            }
            Err(e) => {
                saga.compensate(self, self.remote.as_ref()).await;
                Err(e)
            }
        }
    }

    async fn apply_stock_entry(
        &self,
        ctx: &SessionContext,
        items: &[LineItem],
        origin: Option<String>,
        saga: &mut Saga,
    ) -> SyncResult<StockEntry> {
        self.credit_items(&ctx.store, items, saga).await?;

        let entry = StockEntry {
            id: String::new(),
            destination: ctx.store.clone(),
            origin,
            items: items.to_vec(),
            operator: ctx.operator.clone(),
            timestamp: Utc::now(),
        };
        remote::insert(self.remote.as_ref(), &entry).await
    }

    /// Moves goods from the current store to another registered store.
    ///
    /// ## Errors
    /// - `Core(SameStoreTransfer)` when the destination is the current store
    /// - `NotFound` when the destination isn't a registered store
    /// - `Core(ProductNotFound)` / `Core(InsufficientStock)` at the origin
    ///
    /// Missing products are created at the destination with the origin's
    /// name and price range.
    pub async fn transfer(
        &self,
        ctx: &SessionContext,
        destination: &str,
        items: &[LineItem],
    ) -> SyncResult<Transfer> {
        if same_name(destination, &ctx.store) {
            return Err(CoreError::SameStoreTransfer {
                store: ctx.store.clone(),
            }
            .into());
        }
        validate_items(items)?;
        self.require_online().await?;

        let stores: Vec<Store> = remote::find(self.remote.as_ref(), &Filter::all()).await?;
        let destination = stores
            .into_iter()
            .find(|s| same_name(&s.name, destination))
            .map(|s| s.name)
            .ok_or_else(|| SyncError::not_found("store", destination))?;

        let mut sources = BTreeMap::new();
        for (name, requested) in aggregate(items) {
            let product = self.find_product(&ctx.store, &name).await?;
            if product.quantity < requested {
                return Err(CoreError::InsufficientStock {
                    product: name,
                    available: product.quantity,
                    requested,
                }
                .into());
            }
            sources.insert(name, product);
        }

        let mut saga = Saga::new("transfer");
        let result = self
            .apply_transfer(ctx, &destination, items, &sources, &mut saga)
            .await;
        match result {
            Ok(transfer) => {
                self.audit
                    .record(
                        ctx,
                        AuditAction::Transfer,
                        &destination,
                        format!("{} item(s) from {}", items.len(), ctx.store),
                    )
                    .await;
                info!(origin = %ctx.store, destination = %destination, "Transfer completed");
                Ok(transfer)
            }
            Err(e) => {
                saga.compensate(self, self.remote.as_ref()).await;
                Err(e)
            }
        }
    }

    async fn apply_transfer(
        &self,
        ctx: &SessionContext,
        destination: &str,
        items: &[LineItem],
        sources: &BTreeMap<String, Product>,
        saga: &mut Saga,
    ) -> SyncResult<Transfer> {
        self.debit_items(&ctx.store, items, saga).await?;

        for (name, quantity) in aggregate(items) {
            match self.find_product(destination, &name).await {
                Ok(_) => {
                    self.adjust_stock(destination, &name, quantity).await?;
                    saga.record(Compensation::AdjustStock {
                        store: destination.to_string(),
                        product: name,
                        delta: -quantity,
                    });
                }
                Err(SyncError::Core(CoreError::ProductNotFound { .. })) => {
                    let source = sources
                        .get(&name)
                        .ok_or_else(|| SyncError::Internal(format!("no source for {}", name)))?;
                    let product = Product {
                        id: String::new(),
                        name: name.clone(),
                        quantity,
                        min_price_cents: source.min_price_cents,
                        max_price_cents: source.max_price_cents,
                        store: destination.to_string(),
                        version: 0,
                    };
                    let created = remote::insert(self.remote.as_ref(), &product).await?;
                    saga.record(Compensation::DeleteRecord {
                        collection: Collection::Products,
                        id: created.id,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let transfer = Transfer {
            id: String::new(),
            origin: ctx.store.clone(),
            destination: destination.to_string(),
            items: items.to_vec(),
            operator: ctx.operator.clone(),
            timestamp: Utc::now(),
        };
        let transfer = remote::insert(self.remote.as_ref(), &transfer).await?;
        saga.record(Compensation::DeleteRecord {
            collection: Collection::Transfers,
            id: transfer.id.clone(),
        });

        let entry = StockEntry {
            id: String::new(),
            destination: destination.to_string(),
            origin: Some(ctx.store.clone()),
            items: items.to_vec(),
            operator: ctx.operator.clone(),
            timestamp: transfer.timestamp,
        };
        remote::insert(self.remote.as_ref(), &entry).await?;

        Ok(transfer)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, seed_product, seed_store, stock};

    fn draft(name: &str, quantity: i64) -> ProductDraft {
        ProductDraft {
            name: name.to_string(),
            quantity,
            min_price_cents: 600,
            max_price_cents: 900,
        }
    }

    #[tokio::test]
    async fn test_adjust_stock_and_negative_quantities() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 2, 600, 900).await;
        let inventory = &h.services.inventory;

        let p = inventory.adjust_stock("Socorro", "Caderno", -3).await.unwrap();
        assert_eq!(p.quantity, -1);
        assert_eq!(p.version, 2);

        let err = inventory.adjust_stock("Socorro", "Lapis", 1).await.unwrap_err();
        assert!(matches!(err, SyncError::Core(CoreError::ProductNotFound { .. })));
    }

    #[tokio::test]
    async fn test_rebalance_writes_net_changes_only() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 10, 600, 900).await;
        seed_product(h.remote.as_ref(), "Socorro", "Caneta", 10, 100, 200).await;
        let inventory = &h.services.inventory;

        let mut saga = Saga::new("test");
        inventory
            .rebalance_items(
                "Socorro",
                &[LineItem::new("Caderno", 2), LineItem::new("Caneta", 1)],
                &[LineItem::new("Caderno", 5), LineItem::new("Caneta", 1)],
                &mut saga,
            )
            .await
            .unwrap();

        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 7);
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caneta").await, 10);
        assert_eq!(saga.steps().len(), 1);

        saga.compensate(inventory, h.remote.as_ref()).await;
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 10);
    }

    #[tokio::test]
    async fn test_create_product_rejects_duplicate_names() {
        let h = harness().await;
        let inventory = &h.services.inventory;

        let created = inventory.create_product(&h.ctx, &draft("Caderno", 5)).await.unwrap();
        assert!(matches!(created, ProductWrite::Created(_)));
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 5);

        let err = inventory
            .create_product(&h.ctx, &draft("caderno ", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Duplicate { .. }));
        assert_eq!(h.remote.len(Collection::StockMovements).await, 1);
    }

    #[tokio::test]
    async fn test_offline_product_is_queued_then_replayed() {
        let h = harness().await;
        h.remote.set_available(false);
        let inventory = &h.services.inventory;

        let queued = inventory.create_product(&h.ctx, &draft("Caneta", 10)).await.unwrap();
        assert!(matches!(queued, ProductWrite::Queued(_)));

        let listed = inventory.products("Socorro").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Caneta");

        h.remote.set_available(true);
        assert_eq!(inventory.replay_queued_products(&h.ctx).await.unwrap(), 1);
        assert_eq!(inventory.replay_queued_products(&h.ctx).await.unwrap(), 0);
        assert_eq!(h.remote.len(Collection::Products).await, 1);
    }

    #[tokio::test]
    async fn test_products_fall_back_to_mirror() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 4, 600, 900).await;
        let inventory = &h.services.inventory;

        assert_eq!(inventory.products("Socorro").await.unwrap().len(), 1);

        h.remote.set_available(false);
        let cached = inventory.products("Socorro").await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].quantity, 4);
    }

    #[tokio::test]
    async fn test_edit_and_delete_product() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 4, 600, 900).await;
        let inventory = &h.services.inventory;

        let edited = inventory
            .edit_product(&h.ctx, "Caderno", &draft("Caderno A4", 7))
            .await
            .unwrap();
        assert_eq!(edited.name, "Caderno A4");
        assert_eq!(edited.quantity, 7);

        inventory.delete_product(&h.ctx, "Caderno A4").await.unwrap();
        assert_eq!(h.remote.len(Collection::Products).await, 0);
        assert_eq!(h.remote.len(Collection::StockMovements).await, 2);
    }

    #[tokio::test]
    async fn test_stock_entry_credits_existing_products() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 1, 600, 900).await;
        let inventory = &h.services.inventory;

        inventory
            .stock_entry(&h.ctx, &[LineItem::new("Caderno", 4)], None)
            .await
            .unwrap();
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 5);

        let err = inventory
            .stock_entry(&h.ctx, &[LineItem::new("Lapis", 1)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Core(CoreError::ProductNotFound { .. })));
    }

    #[tokio::test]
    async fn test_transfer_moves_and_creates_products() {
        let h = harness().await;
        seed_store(h.remote.as_ref(), "Centro").await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 5, 600, 900).await;
        seed_product(h.remote.as_ref(), "Socorro", "Caneta", 3, 100, 200).await;
        seed_product(h.remote.as_ref(), "Centro", "Caderno", 1, 600, 900).await;
        let inventory = &h.services.inventory;

        inventory
            .transfer(
                &h.ctx,
                "Centro",
                &[LineItem::new("Caderno", 2), LineItem::new("Caneta", 3)],
            )
            .await
            .unwrap();

        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 3);
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caneta").await, 0);
        assert_eq!(stock(h.remote.as_ref(), "Centro", "Caderno").await, 3);

        let created = inventory.find_product("Centro", "Caneta").await.unwrap();
        assert_eq!(created.quantity, 3);
        assert_eq!(created.min_price_cents, 100);

        assert_eq!(h.remote.len(Collection::Transfers).await, 1);
        assert_eq!(h.remote.len(Collection::StockEntries).await, 1);

        let totals = inventory.stock_totals_by_store().await.unwrap();
        assert_eq!(totals.get("Socorro"), Some(&3));
        assert_eq!(totals.get("Centro"), Some(&6));
    }

    #[tokio::test]
    async fn test_transfer_rejections() {
        let h = harness().await;
        seed_store(h.remote.as_ref(), "Centro").await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 1, 600, 900).await;
        let inventory = &h.services.inventory;
        let items = [LineItem::new("Caderno", 2)];

        let same = inventory.transfer(&h.ctx, "socorro", &items).await.unwrap_err();
        assert!(matches!(same, SyncError::Core(CoreError::SameStoreTransfer { .. })));

        let unknown = inventory.transfer(&h.ctx, "Norte", &items).await.unwrap_err();
        assert!(matches!(unknown, SyncError::NotFound { .. }));

        let short = inventory.transfer(&h.ctx, "Centro", &items).await.unwrap_err();
        assert!(matches!(short, SyncError::Core(CoreError::InsufficientStock { .. })));
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 1);
    }

    #[tokio::test]
    async fn test_failed_transfer_is_compensated() {
        let h = harness().await;
        seed_store(h.remote.as_ref(), "Centro").await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 5, 600, 900).await;
        h.remote.fail_writes(Collection::Transfers).await;

        let err = h
            .services
            .inventory
            .transfer(&h.ctx, "Centro", &[LineItem::new("Caderno", 2)])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteWriteFailure(_)));

        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 5);
        let dest = h.services.inventory.find_product("Centro", "Caderno").await;
        assert!(dest.is_err());
    }
}
