//! # Sale Submission Workflow
//!
//! Validates a sale, asks the operator about anything unusual, then writes
//! it to the remote store or to the local queue.
//!
//! ## Submission Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SaleService::submit                              │
//! │                                                                         │
//! │  1. validate draft (items, quantities, note)                            │
//! │  2. every item names a product of the store                             │
//! │  3. stock shortfall?    ──► prompt, declined = Cancelled                │
//! │  4. payments positive                                                   │
//! │  5. paid < minimum?     ──► alert = true, prompt, declined = Cancelled  │
//! │  6. correlation id assigned                                             │
//! │                                                                         │
//! │          online?                                                        │
//! │         ┌───┴────────────────────────┐                                  │
//! │         ▼ yes                        ▼ no                               │
//! │  same correlation id remote?   enqueue (pending)                        │
//! │    yes ──► AlreadyRecorded     stock untouched until                    │
//! │    no  ──► write sale          the reconciler writes it                 │
//! │            debit stock (saga)                                           │
//! │            mirror + audit                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed remote write is reported to the operator. The sale is not
//! demoted to the queue.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use chrono::Utc;

use banz_core::reconcile::{dedup_latest, merge_snapshot, MatchPolicy};
use banz_core::totals::{is_below_minimum, minimum_total};
use banz_core::validation::{check_line_items, validate_payments, validate_sale_draft};
use banz_core::{
    new_id, AuditAction, PendingEntry, Product, QueueKind, RecordId, Sale, SaleDraft,
    SessionContext,
};
use banz_db::{Database, MirrorKind};

use crate::audit::AuditLogger;
use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use crate::inventory::InventoryService;
use crate::prompt::OperatorPrompt;
use crate::remote::{self, Collection, Filter, RemoteStore};
use crate::saga::{Compensation, Saga};

/// What happened to a submitted sale.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Written to the remote store; stock debited.
    Recorded(Sale),
    /// Kept in the local queue.
    Queued(Sale),
    /// A remote sale with the same correlation id already existed.
    AlreadyRecorded(Sale),
}

impl SubmitOutcome {
    pub fn sale(&self) -> &Sale {
        match self {
            SubmitOutcome::Recorded(s) | SubmitOutcome::Queued(s) | SubmitOutcome::AlreadyRecorded(s) => s,
        }
    }
}

fn clean_note(note: &Option<String>) -> Option<String> {
    note.as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

#[derive(Clone)]
pub struct SaleService {
    remote: Arc<dyn RemoteStore>,
    db: Database,
    inventory: InventoryService,
    audit: AuditLogger,
    connectivity: Connectivity,
    prompt: Arc<dyn OperatorPrompt>,
    policy: MatchPolicy,
}

impl SaleService {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        db: Database,
        inventory: InventoryService,
        audit: AuditLogger,
        connectivity: Connectivity,
        prompt: Arc<dyn OperatorPrompt>,
        policy: MatchPolicy,
    ) -> Self {
        SaleService {
            remote,
            db,
            inventory,
            audit,
            connectivity,
            prompt,
            policy,
        }
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Records a new sale under a fresh correlation id.
    pub async fn submit(&self, ctx: &SessionContext, draft: &SaleDraft) -> SyncResult<SubmitOutcome> {
        self.submit_with_correlation(ctx, draft, new_id()).await
    }

    /// Records a sale under a caller-chosen correlation id.
    ///
    /// Retrying with the same id never creates a second remote sale.
    pub async fn submit_with_correlation(
        &self,
        ctx: &SessionContext,
        draft: &SaleDraft,
        correlation_id: String,
    ) -> SyncResult<SubmitOutcome> {
        validate_sale_draft(draft)?;

        let products = self.inventory.products(&ctx.store).await?;
        let below_minimum_alert = self.confirm(draft, &products)?;

        let sale = Sale {
            id: RecordId::new_local(),
            correlation_id: Some(correlation_id),
            store: ctx.store.clone(),
            seller: ctx.operator.clone(),
            items: draft.items.clone(),
            payments: draft.payments.clone(),
            note: clean_note(&draft.note),
            timestamp: Utc::now(),
            below_minimum_alert,
            version: 0,
        };

        if self.connectivity.is_online().await {
            self.record_online(ctx, sale).await
        } else {
            self.queue_offline(ctx, sale).await
        }
    }

    /// Stock and minimum-price confirmations. Returns the alert flag.
    fn confirm(&self, draft: &SaleDraft, products: &[Product]) -> SyncResult<bool> {
        for shortfall in check_line_items(&draft.items, products)? {
            if !self.prompt.confirm_stock_override(&shortfall) {
                return Err(SyncError::Cancelled(format!(
                    "only {} of {} in stock",
                    shortfall.available, shortfall.product
                )));
            }
        }

        validate_payments(&draft.payments)?;

        let paid = draft.paid();
        let minimum = minimum_total(&draft.items, products);
        let alert = is_below_minimum(paid, minimum);
        if alert && !self.prompt.confirm_below_minimum(paid, minimum) {
            return Err(SyncError::Cancelled(format!(
                "paid {} below minimum {}",
                paid, minimum
            )));
        }

        Ok(alert)
    }

    async fn record_online(&self, ctx: &SessionContext, sale: Sale) -> SyncResult<SubmitOutcome> {
        let correlation = sale.correlation_id.clone().unwrap_or_default();

        let filter = Filter::all().eq("correlation_id", correlation.as_str());
        if let Some(existing) = remote::find::<Sale>(self.remote.as_ref(), &filter)
            .await?
            .into_iter()
            .next()
        {
            info!(correlation_id = %correlation, id = %existing.id, "Sale already recorded");
            return Ok(SubmitOutcome::AlreadyRecorded(existing));
        }

        let stored = match remote::insert(self.remote.as_ref(), &sale).await {
            Ok(stored) => stored,
            Err(e @ (SyncError::RemoteUnavailable | SyncError::RemoteWriteFailure(_))) => return Err(e),
            Err(e) => return Err(SyncError::RemoteWriteFailure(e.to_string())),
        };
        let remote_id = stored.id.as_str().to_string();

        let mut saga = Saga::new("record_sale");
        saga.record(Compensation::DeleteRecord {
            collection: Collection::Sales,
            id: remote_id.clone(),
        });
        if let Err(e) = self.inventory.debit_items(&ctx.store, &stored.items, &mut saga).await {
            warn!(id = %remote_id, error = %e, "Stock debit failed, undoing sale");
            saga.compensate(&self.inventory, self.remote.as_ref()).await;
            return Err(e);
        }

        self.cache_sale(&stored).await;
        self.audit
            .record(
                ctx,
                AuditAction::SaleRecorded,
                &remote_id,
                format!("{} paid", stored.paid()),
            )
            .await;

        info!(
            store = %ctx.store,
            id = %remote_id,
            correlation_id = %correlation,
            alert = stored.below_minimum_alert,
            "Sale recorded"
        );
        Ok(SubmitOutcome::Recorded(stored))
    }

    async fn queue_offline(&self, ctx: &SessionContext, sale: Sale) -> SyncResult<SubmitOutcome> {
        let entry = PendingEntry::new(sale.id.as_str(), sale.clone());
        self.db
            .pending_queue()
            .enqueue(&ctx.store, QueueKind::Sales, &entry)
            .await?;

        info!(store = %ctx.store, id = %sale.id, "Sale queued offline");
        Ok(SubmitOutcome::Queued(sale))
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Deletes a sale and puts its items back in stock.
    ///
    /// A queued sale is only flagged; the reconciler carries the delete
    /// over once the sale reaches the remote store.
    pub async fn delete_sale(&self, ctx: &SessionContext, id: &RecordId) -> SyncResult<()> {
        match id {
            RecordId::Local(local_id) => {
                let queue = self.db.pending_queue();
                let entry = queue
                    .get::<Sale>(&ctx.store, QueueKind::Sales, local_id)
                    .await?
                    .filter(|e| !e.deleted)
                    .ok_or_else(|| SyncError::not_found("sale", id.to_string()))?;

                match entry.remote_id {
                    Some(remote_id) if self.connectivity.is_online().await => {
                        self.delete_remote_sale(&remote_id).await?;
                        queue.remove(&ctx.store, QueueKind::Sales, local_id).await?;
                        self.audit
                            .record(ctx, AuditAction::SaleDeleted, &remote_id, "")
                            .await;
                    }
                    _ => {
                        queue.mark_deleted(&ctx.store, QueueKind::Sales, local_id).await?;
                        debug!(id = %id, "Queued sale flagged for deletion");
                    }
                }
                Ok(())
            }
            RecordId::Remote(remote_id) => {
                self.require_online().await?;
                let sale = self.delete_remote_sale(remote_id).await?;
                self.audit
                    .record(
                        ctx,
                        AuditAction::SaleDeleted,
                        remote_id,
                        format!("{} item(s) returned to stock", sale.items.len()),
                    )
                    .await;
                Ok(())
            }
        }
    }

    /// Restores stock for a remote sale, then deletes it.
    pub(crate) async fn delete_remote_sale(&self, remote_id: &str) -> SyncResult<Sale> {
        let sale: Sale = remote::fetch(self.remote.as_ref(), remote_id)
            .await?
            .ok_or_else(|| SyncError::not_found("sale", remote_id))?;

        let mut saga = Saga::new("delete_sale");
        if let Err(e) = self.inventory.credit_items(&sale.store, &sale.items, &mut saga).await {
            saga.compensate(&self.inventory, self.remote.as_ref()).await;
            return Err(e);
        }
        if let Err(e) = self.remote.delete(Collection::Sales, remote_id).await {
            saga.compensate(&self.inventory, self.remote.as_ref()).await;
            return Err(e);
        }

        self.uncache_sale(&sale.store, &sale.id).await;
        info!(store = %sale.store, id = %remote_id, "Sale deleted");
        Ok(sale)
    }

    // =========================================================================
    // Editing
    // =========================================================================

    /// Replaces the items, payments and note of a sale.
    ///
    /// Stock moves by the difference between the old and new items, and
    /// the below-minimum alert is recomputed.
    pub async fn edit_sale(&self, ctx: &SessionContext, id: &RecordId, draft: &SaleDraft) -> SyncResult<Sale> {
        validate_sale_draft(draft)?;

        match id {
            RecordId::Local(local_id) => {
                let entry = self
                    .db
                    .pending_queue()
                    .get::<Sale>(&ctx.store, QueueKind::Sales, local_id)
                    .await?
                    .filter(|e| !e.deleted)
                    .ok_or_else(|| SyncError::not_found("sale", id.to_string()))?;

                match entry.remote_id {
                    Some(remote_id) if self.connectivity.is_online().await => {
                        let edited = self.edit_remote_sale(ctx, &remote_id, draft).await?;
                        self.db
                            .pending_queue()
                            .remove(&ctx.store, QueueKind::Sales, local_id)
                            .await?;
                        Ok(edited)
                    }
                    _ => self.edit_queued_sale(ctx, entry, draft).await,
                }
            }
            RecordId::Remote(remote_id) => {
                self.require_online().await?;
                self.edit_remote_sale(ctx, remote_id, draft).await
            }
        }
    }

    async fn edit_queued_sale(
        &self,
        ctx: &SessionContext,
        entry: PendingEntry<Sale>,
        draft: &SaleDraft,
    ) -> SyncResult<Sale> {
        let products = self.inventory.products(&ctx.store).await?;
        let alert = self.confirm(draft, &products)?;

        let patch = json!({
            "items": draft.items,
            "payments": draft.payments,
            "note": clean_note(&draft.note),
            "below_minimum_alert": alert,
        });
        self.db
            .pending_queue()
            .mark_edited(&ctx.store, QueueKind::Sales, &entry.local_id, &patch)
            .await?;

        debug!(id = %entry.local_id, "Queued sale edited in place");
        Ok(Sale {
            items: draft.items.clone(),
            payments: draft.payments.clone(),
            note: clean_note(&draft.note),
            below_minimum_alert: alert,
            ..entry.record
        })
    }

    async fn edit_remote_sale(&self, ctx: &SessionContext, remote_id: &str, draft: &SaleDraft) -> SyncResult<Sale> {
        let old: Sale = remote::fetch(self.remote.as_ref(), remote_id)
            .await?
            .ok_or_else(|| SyncError::not_found("sale", remote_id))?;

        // The old items are already out of stock; count them as available
        let mut products = self.inventory.products(&ctx.store).await?;
        for (name, quantity) in old.quantity_by_product() {
            if let Some(p) = products.iter_mut().find(|p| p.name == name) {
                p.quantity += quantity;
            }
        }
        let alert = self.confirm(draft, &products)?;

        let edited = Sale {
            items: draft.items.clone(),
            payments: draft.payments.clone(),
            note: clean_note(&draft.note),
            below_minimum_alert: alert,
            ..old.clone()
        };

        let mut saga = Saga::new("edit_sale");
        if let Err(e) = self
            .inventory
            .rebalance_items(&old.store, &old.items, &edited.items, &mut saga)
            .await
        {
            saga.compensate(&self.inventory, self.remote.as_ref()).await;
            return Err(e);
        }

        let stored = match remote::replace(self.remote.as_ref(), remote_id, &edited, Some(old.version)).await {
            Ok(stored) => stored,
            Err(e) => {
                saga.compensate(&self.inventory, self.remote.as_ref()).await;
                return Err(e);
            }
        };

        self.cache_sale(&stored).await;
        self.audit
            .record(
                ctx,
                AuditAction::SaleEdited,
                remote_id,
                format!("{} -> {}", old.paid(), stored.paid()),
            )
            .await;
        Ok(stored)
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Open sales of the current store, newest first.
    ///
    /// Queued sales that haven't reached the remote store are included.
    pub async fn list_sales(&self, ctx: &SessionContext) -> SyncResult<Vec<Sale>> {
        let queued: Vec<PendingEntry<Sale>> = self
            .db
            .pending_queue()
            .list_pending(&ctx.store, QueueKind::Sales)
            .await?;
        let local: Vec<Sale> = queued
            .into_iter()
            .filter(|e| !e.deleted && !e.synced)
            .map(|e| e.record)
            .collect();

        if self.connectivity.is_online().await {
            let filter = Filter::all().eq("store", ctx.store.as_str());
            match remote::find::<Sale>(self.remote.as_ref(), &filter).await {
                Ok(remote_sales) => {
                    self.cache_sales(&ctx.store, &remote_sales).await;
                    return Ok(merge_snapshot(&local, &remote_sales, self.policy).sales);
                }
                Err(SyncError::RemoteUnavailable) => {
                    warn!(store = %ctx.store, "Remote store unavailable, using mirror");
                }
                Err(e) => return Err(e),
            }
        }

        let mut sales: Vec<Sale> = self
            .db
            .mirror()
            .get::<Sale>(&ctx.store, MirrorKind::Sales)
            .await?
            .into_iter()
            .filter(|s| !s.is_local())
            .collect();
        sales.extend(local);
        Ok(dedup_latest(sales))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn require_online(&self) -> SyncResult<()> {
        if self.connectivity.is_online().await {
            Ok(())
        } else {
            Err(SyncError::RemoteUnavailable)
        }
    }

    async fn cache_sales(&self, store: &str, sales: &[Sale]) {
        if let Err(e) = self.db.mirror().set(store, MirrorKind::Sales, sales).await {
            warn!(store = %store, error = %e, "Failed to update sales mirror");
        }
    }

    /// Optimistic mirror update ahead of the next snapshot.
    async fn cache_sale(&self, sale: &Sale) {
        let mut cached: Vec<Sale> = match self.db.mirror().get(&sale.store, MirrorKind::Sales).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(store = %sale.store, error = %e, "Failed to read sales mirror");
                return;
            }
        };
        match cached.iter_mut().find(|s| s.id == sale.id) {
            Some(slot) => *slot = sale.clone(),
            None => cached.push(sale.clone()),
        }
        self.cache_sales(&sale.store, &cached).await;
    }

    async fn uncache_sale(&self, store: &str, id: &RecordId) {
        match self.db.mirror().get::<Sale>(store, MirrorKind::Sales).await {
            Ok(cached) => {
                let remaining: Vec<Sale> = cached.into_iter().filter(|s| &s.id != id).collect();
                self.cache_sales(store, &remaining).await;
            }
            Err(e) => warn!(store = %store, error = %e, "Failed to read sales mirror"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
