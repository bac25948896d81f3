//! # Closeout (Fechamento)
//!
//! Archives a store's open sales into one closure per calendar day.
//!
//! ## Close Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  open sales of the store          closures of the store                │
//! │          │                                │                             │
//! │          ▼                                ▼                             │
//! │   group by UTC date               set of closed dates                   │
//! │          │                                │                             │
//! │          └──────────────┬─────────────────┘                             │
//! │                         ▼                                               │
//! │   for each date < today, not closed, with sales (oldest first):         │
//! │      totals = compute_totals(day's sales)                               │
//! │      write closure { store, date, sales, totals }                       │
//! │      delete each archived sale from the live collection                 │
//! │                                                                         │
//! │   close_day additionally archives today's sales (merging into an        │
//! │   existing closure for today) and exports a backup.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Archiving does not touch stock; the sales already debited it. Editing
//! the sales inside a closure does.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use chrono::{NaiveDate, Utc};

use banz_core::totals::{closable_days, compute_totals, group_by_day, is_below_minimum, minimum_total};
use banz_core::validation::{check_line_items, validate_payments, validate_sale_draft};
use banz_core::{new_id, AuditAction, Closure, RecordId, Sale, SaleDraft, SessionContext};

use crate::audit::AuditLogger;
use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use crate::export::Exporter;
use crate::inventory::InventoryService;
use crate::remote::{self, Collection, Filter, RemoteStore};
use crate::saga::Saga;

/// Result of a manual day close.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseDayReport {
    /// Closures written or extended, oldest first.
    pub closures: Vec<Closure>,
    /// Backup written after closing.
    pub export: PathBuf,
}

#[derive(Clone)]
pub struct CloseoutService {
    remote: Arc<dyn RemoteStore>,
    inventory: InventoryService,
    audit: AuditLogger,
    connectivity: Connectivity,
    exporter: Exporter,
}

impl CloseoutService {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        inventory: InventoryService,
        audit: AuditLogger,
        connectivity: Connectivity,
        exporter: Exporter,
    ) -> Self {
        CloseoutService {
            remote,
            inventory,
            audit,
            connectivity,
            exporter,
        }
    }

    async fn require_online(&self) -> SyncResult<()> {
        if self.connectivity.is_online().await {
            Ok(())
        } else {
            Err(SyncError::RemoteUnavailable)
        }
    }

    async fn open_sales(&self, store: &str) -> SyncResult<Vec<Sale>> {
        remote::find(self.remote.as_ref(), &Filter::all().eq("store", store)).await
    }

    // =========================================================================
    // Closing
    // =========================================================================

    /// Closes every past day of the store that has open sales and no
    /// closure yet.
    ///
    /// Sales dated `today` are left alone.
    pub async fn auto_close(&self, ctx: &SessionContext, today: NaiveDate) -> SyncResult<Vec<Closure>> {
        self.require_online().await?;

        let open = self.open_sales(&ctx.store).await?;
        if open.is_empty() {
            return Ok(Vec::new());
        }

        let closed: BTreeSet<NaiveDate> = self
            .list_closures(ctx)
            .await?
            .into_iter()
            .map(|c| c.date)
            .collect();
        let mut groups = group_by_day(&open);

        let mut closures = Vec::new();
        for day in closable_days(&open, &closed, today) {
            let sales = groups.remove(&day).unwrap_or_default();
            closures.push(self.archive_day(ctx, day, sales, None).await?);
        }

        if !closures.is_empty() {
            info!(store = %ctx.store, days = closures.len(), "Past days closed");
        }
        Ok(closures)
    }

    /// Manual close: past days first, then today's open sales, then a
    /// backup of every collection.
    ///
    /// Today's sales are merged into today's closure if one exists. Use
    /// [`auto_close`](Self::auto_close) to close past days only and leave
    /// today's sales open.
    pub async fn close_day(&self, ctx: &SessionContext, today: NaiveDate) -> SyncResult<CloseDayReport> {
        let mut closures = self.auto_close(ctx, today).await?;

        let todays: Vec<Sale> = self
            .open_sales(&ctx.store)
            .await?
            .into_iter()
            .filter(|s| s.day() == today)
            .collect();

        if !todays.is_empty() {
            let existing = self.closure_for(&ctx.store, today).await?;
            closures.push(self.archive_day(ctx, today, todays, existing).await?);
        }

        let export = self.exporter.export_all(today).await?;
        Ok(CloseDayReport { closures, export })
    }

    async fn closure_for(&self, store: &str, date: NaiveDate) -> SyncResult<Option<Closure>> {
        let filter = Filter::all()
            .eq("store", store)
            .eq("date", date.format("%Y-%m-%d").to_string());
        Ok(remote::find::<Closure>(self.remote.as_ref(), &filter)
            .await?
            .into_iter()
            .next())
    }

    /// Writes (or extends) the closure for `date`, then removes the
    /// archived sales from the live collection.
    async fn archive_day(
        &self,
        ctx: &SessionContext,
        date: NaiveDate,
        sales: Vec<Sale>,
        existing: Option<Closure>,
    ) -> SyncResult<Closure> {
        let archived_ids: Vec<String> = sales.iter().map(|s| s.id.as_str().to_string()).collect();

        let closure = match existing {
            Some(existing) => {
                let mut all = existing.sales.clone();
                all.extend(sales);
                let updated = Closure {
                    totals: compute_totals(&all),
                    sales: all,
                    ..existing.clone()
                };
                remote::replace(self.remote.as_ref(), &existing.id, &updated, Some(existing.version)).await?
            }
            None => {
                let closure = Closure {
                    id: String::new(),
                    store: ctx.store.clone(),
                    date,
                    totals: compute_totals(&sales),
                    sales,
                    version: 0,
                };
                remote::insert(self.remote.as_ref(), &closure).await?
            }
        };

        for id in &archived_ids {
            if !self.remote.delete(Collection::Sales, id).await? {
                warn!(id = %id, "Archived sale was already gone");
            }
        }

        self.audit
            .record(
                ctx,
                AuditAction::DayClosed,
                date.to_string(),
                format!(
                    "{} sale(s), total {}",
                    archived_ids.len(),
                    closure.totals.total()
                ),
            )
            .await;
        info!(
            store = %ctx.store,
            date = %date,
            sales = archived_ids.len(),
            total = %closure.totals.total(),
            "Day closed"
        );
        Ok(closure)
    }

    // =========================================================================
    // Closure Queries
    // =========================================================================

    /// Closures of the current store, most recent date first.
    pub async fn list_closures(&self, ctx: &SessionContext) -> SyncResult<Vec<Closure>> {
        let mut closures: Vec<Closure> =
            remote::find(self.remote.as_ref(), &Filter::all().eq("store", ctx.store.as_str())).await?;
        closures.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(closures)
    }

    pub async fn get_closure(&self, id: &str) -> SyncResult<Closure> {
        remote::fetch(self.remote.as_ref(), id)
            .await?
            .ok_or_else(|| SyncError::not_found("closure", id))
    }

    /// Deletes a closure. Its sales are gone for good; stock is untouched.
    pub async fn delete_closure(&self, ctx: &SessionContext, id: &str) -> SyncResult<()> {
        self.require_online().await?;
        let closure = self.get_closure(id).await?;

        self.remote.delete(Collection::Closures, id).await?;
        self.audit
            .record(
                ctx,
                AuditAction::ClosureDeleted,
                id,
                format!("{} {}", closure.store, closure.date),
            )
            .await;
        info!(id = %id, date = %closure.date, "Closure deleted");
        Ok(())
    }

    // =========================================================================
    // Closure Edits
    // =========================================================================

    /// Builds a sale for a closure and works out its alert flag.
    async fn sale_from_draft(&self, closure: &Closure, draft: &SaleDraft) -> SyncResult<bool> {
        validate_sale_draft(draft)?;
        let products = self.inventory.products(&closure.store).await?;
        check_line_items(&draft.items, &products)?;
        validate_payments(&draft.payments)?;
        Ok(is_below_minimum(draft.paid(), minimum_total(&draft.items, &products)))
    }

    /// Adds a sale to a closed day and takes its items out of stock.
    pub async fn add_sale(&self, ctx: &SessionContext, closure_id: &str, draft: &SaleDraft) -> SyncResult<Closure> {
        self.require_online().await?;
        let closure = self.get_closure(closure_id).await?;
        let alert = self.sale_from_draft(&closure, draft).await?;

        let timestamp = closure
            .date
            .and_hms_opt(12, 0, 0)
            .map(|noon| noon.and_utc())
            .unwrap_or_else(Utc::now);
        let sale = Sale {
            id: RecordId::Remote(new_id()),
            correlation_id: Some(new_id()),
            store: closure.store.clone(),
            seller: ctx.operator.clone(),
            items: draft.items.clone(),
            payments: draft.payments.clone(),
            note: draft.note.clone().filter(|n| !n.trim().is_empty()),
            timestamp,
            below_minimum_alert: alert,
            version: 0,
        };

        let mut saga = Saga::new("closure_add_sale");
        if let Err(e) = self.inventory.debit_items(&closure.store, &sale.items, &mut saga).await {
            saga.compensate(&self.inventory, self.remote.as_ref()).await;
            return Err(e);
        }

        let mut sales = closure.sales.clone();
        sales.push(sale);
        self.store_edit(ctx, closure, sales, saga, "sale added").await
    }

    /// Removes a sale from a closure and puts its items back in stock.
    pub async fn remove_sale(&self, ctx: &SessionContext, closure_id: &str, sale_id: &str) -> SyncResult<Closure> {
        self.require_online().await?;
        let closure = self.get_closure(closure_id).await?;

        let (removed, sales): (Vec<Sale>, Vec<Sale>) = closure
            .sales
            .iter()
            .cloned()
            .partition(|s| s.id.as_str() == sale_id);
        let removed = removed
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::not_found("sale", sale_id))?;

        let mut saga = Saga::new("closure_remove_sale");
        if let Err(e) = self.inventory.credit_items(&closure.store, &removed.items, &mut saga).await {
            saga.compensate(&self.inventory, self.remote.as_ref()).await;
            return Err(e);
        }

        self.store_edit(ctx, closure, sales, saga, "sale removed").await
    }

    /// Replaces a closed sale's items, payments and note.
    pub async fn edit_sale(
        &self,
        ctx: &SessionContext,
        closure_id: &str,
        sale_id: &str,
        draft: &SaleDraft,
    ) -> SyncResult<Closure> {
        self.require_online().await?;
        let closure = self.get_closure(closure_id).await?;
        let alert = self.sale_from_draft(&closure, draft).await?;

        let mut sales = closure.sales.clone();
        let slot = sales
            .iter_mut()
            .find(|s| s.id.as_str() == sale_id)
            .ok_or_else(|| SyncError::not_found("sale", sale_id))?;

        let mut saga = Saga::new("closure_edit_sale");
        if let Err(e) = self
            .inventory
            .rebalance_items(&closure.store, &slot.items, &draft.items, &mut saga)
            .await
        {
            saga.compensate(&self.inventory, self.remote.as_ref()).await;
            return Err(e);
        }

        slot.items = draft.items.clone();
        slot.payments = draft.payments.clone();
        slot.note = draft.note.clone().filter(|n| !n.trim().is_empty());
        slot.below_minimum_alert = alert;

        self.store_edit(ctx, closure, sales, saga, "sale edited").await
    }

    /// Writes the edited sales and recomputed totals with compare-and-set,
    /// undoing the stock moves if the write fails.
    async fn store_edit(
        &self,
        ctx: &SessionContext,
        closure: Closure,
        sales: Vec<Sale>,
        saga: Saga,
        what: &str,
    ) -> SyncResult<Closure> {
        let updated = Closure {
            totals: compute_totals(&sales),
            sales,
            ..closure.clone()
        };

        match remote::replace(self.remote.as_ref(), &closure.id, &updated, Some(closure.version)).await {
            Ok(stored) => {
                self.audit
                    .record(
                        ctx,
                        AuditAction::ClosureEdited,
                        &closure.id,
                        format!("{}, total {}", what, stored.totals.total()),
                    )
                    .await;
                Ok(stored)
            }
            Err(e) => {
                saga.compensate(&self.inventory, self.remote.as_ref()).await;
                Err(e)
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{draft, harness, seed_product, stock};
    use banz_core::{LineItem, Money, Payment, PaymentMethod};
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    async fn open_sale(
        remote: &dyn RemoteStore,
        d: u32,
        qty: i64,
        method: PaymentMethod,
        cents: i64,
        alert: bool,
    ) -> Sale {
        let sale = Sale {
            id: RecordId::Remote(String::new()),
            correlation_id: Some(new_id()),
            store: "Socorro".to_string(),
            seller: "ryan".to_string(),
            items: vec![LineItem::new("Caderno", qty)],
            payments: vec![Payment::new(method, Money::from_cents(cents))],
            note: None,
            timestamp: Utc.with_ymd_and_hms(2024, 1, d, 15, 0, 0).unwrap(),
            below_minimum_alert: alert,
            version: 0,
        };
        remote::insert(remote, &sale).await.unwrap()
    }

    #[tokio::test]
    async fn test_close_day_archives_past_sales_with_totals() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 10, 600, 900).await;
        open_sale(h.remote.as_ref(), 1, 2, PaymentMethod::Cash, 1000, true).await;
        open_sale(h.remote.as_ref(), 1, 1, PaymentMethod::Pix, 800, false).await;

        let report = h.services.closeout.close_day(&h.ctx, day(2)).await.unwrap();
        assert_eq!(report.closures.len(), 1);
        assert!(report.export.exists());

        let closure = &report.closures[0];
        assert_eq!(closure.date, day(1));
        assert_eq!(closure.sales.len(), 2);
        assert_eq!(closure.totals.total_cents, 1800);
        assert_eq!(closure.totals.cash_cents, 1000);
        assert_eq!(closure.totals.electronic_cents, 800);
        assert_eq!(closure.totals.alerts, 1);
        assert_eq!(closure.totals.items.get("Caderno"), Some(&3));

        assert_eq!(h.remote.len(Collection::Sales).await, 0);
        // Archiving doesn't touch stock
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 10);
    }

    #[tokio::test]
    async fn test_auto_close_leaves_today_and_closed_days() {
        let h = harness().await;
        open_sale(h.remote.as_ref(), 1, 1, PaymentMethod::Cash, 800, false).await;
        open_sale(h.remote.as_ref(), 2, 1, PaymentMethod::Cash, 800, false).await;
        open_sale(h.remote.as_ref(), 3, 1, PaymentMethod::Cash, 800, false).await;

        let closeout = &h.services.closeout;
        let closed = closeout.auto_close(&h.ctx, day(3)).await.unwrap();
        let dates: Vec<NaiveDate> = closed.iter().map(|c| c.date).collect();
        assert_eq!(dates, vec![day(1), day(2)]);
        assert_eq!(h.remote.len(Collection::Sales).await, 1);

        // Nothing left to close, and no empty closures
        assert!(closeout.auto_close(&h.ctx, day(3)).await.unwrap().is_empty());

        // A late sale for an already-closed day stays open
        open_sale(h.remote.as_ref(), 1, 1, PaymentMethod::Pix, 500, false).await;
        assert!(closeout.auto_close(&h.ctx, day(3)).await.unwrap().is_empty());

        let listed = closeout.list_closures(&h.ctx).await.unwrap();
        assert_eq!(listed[0].date, day(2));
    }

    #[tokio::test]
    async fn test_close_day_merges_into_todays_closure() {
        let h = harness().await;
        let today = Utc::now().date_naive();
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 10, 600, 900).await;

        let sales = &h.services.sales;
        sales
            .submit(&h.ctx, &draft(&[("Caderno", 1)], &[(PaymentMethod::Cash, 800)]))
            .await
            .unwrap();
        let first = h.services.closeout.close_day(&h.ctx, today).await.unwrap();
        assert_eq!(first.closures.len(), 1);

        sales
            .submit(&h.ctx, &draft(&[("Caderno", 1)], &[(PaymentMethod::Pix, 700)]))
            .await
            .unwrap();
        let second = h.services.closeout.close_day(&h.ctx, today).await.unwrap();
        assert_eq!(second.closures.len(), 1);
        assert_eq!(second.closures[0].id, first.closures[0].id);
        assert_eq!(second.closures[0].sales.len(), 2);
        assert_eq!(second.closures[0].totals.total_cents, 1500);
        assert_eq!(h.remote.len(Collection::Closures).await, 1);
    }

    #[tokio::test]
    async fn test_closure_edits_replay_stock_and_totals() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 10, 600, 900).await;
        let archived = open_sale(h.remote.as_ref(), 1, 2, PaymentMethod::Cash, 1200, false).await;
        let closure = h.services.closeout.auto_close(&h.ctx, day(2)).await.unwrap().remove(0);
        let closeout = &h.services.closeout;

        let added = closeout
            .add_sale(&h.ctx, &closure.id, &draft(&[("Caderno", 3)], &[(PaymentMethod::Credit, 1000)]))
            .await
            .unwrap();
        assert_eq!(added.sales.len(), 2);
        assert_eq!(added.totals.alerts, 1);
        assert_eq!(added.totals.electronic_cents, 1000);
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 7);
        assert_eq!(added.sales[1].day(), day(1));

        let edited = closeout
            .edit_sale(
                &h.ctx,
                &closure.id,
                archived.id.as_str(),
                &draft(&[("Caderno", 1)], &[(PaymentMethod::Cash, 600)]),
            )
            .await
            .unwrap();
        assert_eq!(edited.totals.cash_cents, 600);
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 8);

        let removed = closeout
            .remove_sale(&h.ctx, &closure.id, archived.id.as_str())
            .await
            .unwrap();
        assert_eq!(removed.sales.len(), 1);
        assert_eq!(removed.totals.total_cents, 1000);
        assert_eq!(removed.totals.items.get("Caderno"), Some(&3));
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 9);

        let missing = closeout
            .remove_sale(&h.ctx, &closure.id, "nope")
            .await
            .unwrap_err();
        assert!(matches!(missing, SyncError::NotFound { .. }));

        closeout.delete_closure(&h.ctx, &closure.id).await.unwrap();
        assert!(closeout.list_closures(&h.ctx).await.unwrap().is_empty());
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 9);
    }

    #[tokio::test]
    async fn test_closing_requires_connection() {
        let h = harness().await;
        h.remote.set_available(false);
        let err = h.services.closeout.auto_close(&h.ctx, day(2)).await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable));
    }
}
