//! # Reconciliation
//!
//! Brings the local queue and mirror in line with the remote store.
//!
//! ## Replay (on reconnect)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for each queued sale, oldest first:                                    │
//! │                                                                         │
//! │   remote counterpart?  (remote_id if known, else correlation id,        │
//! │                         else legacy heuristic when enabled)             │
//! │      │                                                                  │
//! │      ├── none, flagged deleted ─────────► purge (never reached remote)  │
//! │      ├── none, already archived ────────► purge                         │
//! │      ├── none ──► create, debit stock ──► purge                         │
//! │      ├── found, flagged deleted ──► restore stock, delete ──► purge     │
//! │      ├── found, flagged edited ───► move stock, update ────► purge      │
//! │      └── found ─────────────────────────► purge                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock for an offline sale is debited exactly once, when its remote
//! record is created here. Replaying twice creates nothing new: the first
//! pass purged the entry, and an entry left behind by a crash finds its
//! counterpart by correlation id.
//!
//! ## Snapshots
//! Each remote snapshot of the sales collection is merged with the queue:
//! matched entries are purged (or marked synced when an edit or delete is
//! still waiting), and the mirror is rewritten. No remote writes happen on
//! this path.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use chrono::{DateTime, Utc};

use banz_core::reconcile::{find_match, merge_snapshot, MatchPolicy, MergeOutcome};
use banz_core::{AuditAction, Closure, PendingEntry, QueueKind, Sale, SessionContext};
use banz_db::{Database, MirrorKind};

use crate::audit::AuditLogger;
use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use crate::inventory::InventoryService;
use crate::remote::{self, Collection, Filter, RemoteDoc, RemoteStore, Subscription};
use crate::saga::{Compensation, Saga};
use crate::sales::SaleService;

// =============================================================================
// Replay Report
// =============================================================================

/// What one replay pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Queued sales written to the remote store.
    pub created: usize,
    /// Queued sales that were already there.
    pub matched: usize,
    /// Queued deletes carried out (or dropped before reaching the remote).
    pub deleted: usize,
    /// Queued edits carried over.
    pub edited: usize,
    /// Entries whose remote counterpart is gone (archived or deleted).
    pub discarded: usize,
    /// Products created offline and published.
    pub products_created: usize,
    /// Entries left queued: (local id, error).
    pub failed: Vec<(String, String)>,
}

impl ReplayReport {
    pub fn is_empty(&self) -> bool {
        *self == ReplayReport::default()
    }
}

// =============================================================================
// Reconciler
// =============================================================================

#[derive(Clone)]
pub struct Reconciler {
    remote: Arc<dyn RemoteStore>,
    db: Database,
    sales: SaleService,
    inventory: InventoryService,
    audit: AuditLogger,
    connectivity: Connectivity,
    policy: MatchPolicy,
}

impl Reconciler {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        db: Database,
        sales: SaleService,
        inventory: InventoryService,
        audit: AuditLogger,
        connectivity: Connectivity,
        policy: MatchPolicy,
    ) -> Self {
        Reconciler {
            remote,
            db,
            sales,
            inventory,
            audit,
            connectivity,
            policy,
        }
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn remote(&self) -> Arc<dyn RemoteStore> {
        self.remote.clone()
    }

    /// Replays the store's queue against the remote store.
    ///
    /// Does nothing while offline. An entry that fails stays queued and is
    /// listed in `failed`; the pass goes on with the next one. Losing the
    /// remote store mid-pass aborts it.
    pub async fn replay_pending(&self, ctx: &SessionContext) -> SyncResult<ReplayReport> {
        if !self.connectivity.is_online().await {
            debug!(store = %ctx.store, "Offline, replay skipped");
            return Ok(ReplayReport::default());
        }

        let mut report = ReplayReport {
            products_created: self.inventory.replay_queued_products(ctx).await?,
            ..Default::default()
        };

        let queue = self.db.pending_queue();
        let entries: Vec<PendingEntry<Sale>> = queue.list_pending(&ctx.store, QueueKind::Sales).await?;
        let store_filter = Filter::all().eq("store", ctx.store.as_str());

        if !entries.is_empty() {
            info!(store = %ctx.store, queued = entries.len(), "Replaying queued sales");

            let mut open: Vec<Sale> = remote::find(self.remote.as_ref(), &store_filter).await?;
            let archived: Vec<Sale> = remote::find::<Closure>(self.remote.as_ref(), &store_filter)
                .await?
                .into_iter()
                .flat_map(|c| c.sales)
                .collect();

            for entry in entries {
                match self
                    .replay_entry(ctx, &entry, &mut open, &archived, &mut report)
                    .await
                {
                    Ok(()) => {
                        queue.remove(&ctx.store, QueueKind::Sales, &entry.local_id).await?;
                    }
                    Err(e @ SyncError::RemoteUnavailable) => return Err(e),
                    Err(e) => {
                        warn!(id = %entry.local_id, error = %e, "Queued sale kept for the next pass");
                        report.failed.push((entry.local_id.clone(), e.to_string()));
                    }
                }
            }
        }

        let fresh: Vec<Sale> = remote::find(self.remote.as_ref(), &store_filter).await?;
        self.on_snapshot(ctx, &fresh).await?;

        if !report.is_empty() {
            info!(store = %ctx.store, report = ?report, "Replay finished");
        }
        Ok(report)
    }

    async fn replay_entry(
        &self,
        ctx: &SessionContext,
        entry: &PendingEntry<Sale>,
        open: &mut Vec<Sale>,
        archived: &[Sale],
        report: &mut ReplayReport,
    ) -> SyncResult<()> {
        let counterpart = match &entry.remote_id {
            Some(remote_id) => open.iter().find(|s| s.id.as_str() == remote_id).cloned(),
            None => find_match(&entry.record, open.as_slice(), self.policy).cloned(),
        };

        let Some(counterpart) = counterpart else {
            if entry.deleted {
                debug!(id = %entry.local_id, "Deleted before reaching the remote store");
                report.deleted += 1;
            } else if entry.synced || find_match(&entry.record, archived, self.policy).is_some() {
                warn!(id = %entry.local_id, "Remote counterpart no longer open, dropping queued change");
                report.discarded += 1;
            } else {
                let created = self.create_remote(ctx, &entry.record).await?;
                open.push(created);
                report.created += 1;
            }
            return Ok(());
        };

        let remote_id = counterpart.id.as_str().to_string();
        if entry.deleted {
            self.sales.delete_remote_sale(&remote_id).await?;
            self.audit
                .record(ctx, AuditAction::SaleDeleted, &remote_id, "replayed offline delete")
                .await;
            open.retain(|s| s.id != counterpart.id);
            report.deleted += 1;
        } else if entry.edited {
            let updated = self.replay_edit(ctx, &counterpart, &entry.record).await?;
            if let Some(slot) = open.iter_mut().find(|s| s.id == updated.id) {
                *slot = updated;
            }
            report.edited += 1;
        } else {
            debug!(id = %entry.local_id, remote_id = %remote_id, "Queued sale already recorded");
            report.matched += 1;
        }
        Ok(())
    }

    /// Writes a queued sale and applies its deferred stock debit.
    async fn create_remote(&self, ctx: &SessionContext, sale: &Sale) -> SyncResult<Sale> {
        let created = remote::insert(self.remote.as_ref(), sale).await?;
        let remote_id = created.id.as_str().to_string();

        let mut saga = Saga::new("replay_sale");
        saga.record(Compensation::DeleteRecord {
            collection: Collection::Sales,
            id: remote_id.clone(),
        });
        if let Err(e) = self.inventory.debit_items(&sale.store, &sale.items, &mut saga).await {
            saga.compensate(&self.inventory, self.remote.as_ref()).await;
            return Err(e);
        }

        self.audit
            .record(
                ctx,
                AuditAction::SaleRecorded,
                &remote_id,
                format!("{} paid, recorded offline", created.paid()),
            )
            .await;
        info!(
            store = %ctx.store,
            id = %remote_id,
            correlation_id = ?created.correlation_id,
            "Queued sale written"
        );
        Ok(created)
    }

    /// Carries an offline edit over to the remote sale.
    async fn replay_edit(&self, ctx: &SessionContext, current: &Sale, edited: &Sale) -> SyncResult<Sale> {
        let mut saga = Saga::new("replay_edit");
        if let Err(e) = self
            .inventory
            .rebalance_items(&current.store, &current.items, &edited.items, &mut saga)
            .await
        {
            saga.compensate(&self.inventory, self.remote.as_ref()).await;
            return Err(e);
        }

        let updated = Sale {
            items: edited.items.clone(),
            payments: edited.payments.clone(),
            note: edited.note.clone(),
            below_minimum_alert: edited.below_minimum_alert,
            ..current.clone()
        };
        let remote_id = current.id.as_str();
        let stored = match remote::replace(self.remote.as_ref(), remote_id, &updated, Some(current.version)).await {
            Ok(stored) => stored,
            Err(e) => {
                saga.compensate(&self.inventory, self.remote.as_ref()).await;
                return Err(e);
            }
        };

        self.audit
            .record(ctx, AuditAction::SaleEdited, remote_id, "replayed offline edit")
            .await;
        Ok(stored)
    }

    /// Merges a remote snapshot of the store's open sales with the queue.
    ///
    /// Safe to call any number of times with the same snapshot.
    pub async fn on_snapshot(&self, ctx: &SessionContext, snapshot: &[Sale]) -> SyncResult<MergeOutcome> {
        let queue = self.db.pending_queue();
        let entries: Vec<PendingEntry<Sale>> = queue.list_pending(&ctx.store, QueueKind::Sales).await?;

        let mut matched = Vec::new();
        let mut visible = Vec::new();
        for entry in entries.iter().filter(|e| !e.synced) {
            match find_match(&entry.record, snapshot, self.policy) {
                Some(found) => {
                    let remote_id = found.id.as_str().to_string();
                    if entry.edited || entry.deleted {
                        queue
                            .mark_synced(&ctx.store, QueueKind::Sales, &entry.local_id, &remote_id)
                            .await?;
                    } else {
                        queue.remove(&ctx.store, QueueKind::Sales, &entry.local_id).await?;
                    }
                    matched.push((entry.local_id.clone(), remote_id));
                }
                None if !entry.deleted => visible.push(entry.record.clone()),
                None => {}
            }
        }

        if let Err(e) = self.db.mirror().set(&ctx.store, MirrorKind::Sales, snapshot).await {
            warn!(store = %ctx.store, error = %e, "Failed to update sales mirror");
        }

        if !matched.is_empty() {
            debug!(store = %ctx.store, matched = matched.len(), "Snapshot confirmed queued sales");
        }

        let merged = merge_snapshot(&visible, snapshot, self.policy);
        Ok(MergeOutcome {
            sales: merged.sales,
            matched,
        })
    }
}

// =============================================================================
// Reconcile Agent
// =============================================================================

/// Status of the background reconciler.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentStatus {
    pub online: bool,
    pub replays: u64,
    pub snapshots: u64,
    pub last_replay: Option<DateTime<Utc>>,
    pub last_report: Option<ReplayReport>,
    pub last_error: Option<String>,
}

/// Handle for the background reconciler.
#[derive(Clone)]
pub struct ReconcileAgentHandle {
    status: Arc<RwLock<AgentStatus>>,
    shutdown_tx: mpsc::Sender<()>,
}

impl ReconcileAgentHandle {
    pub async fn status(&self) -> AgentStatus {
        self.status.read().await.clone()
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::Internal("reconcile agent already stopped".into()))
    }
}

enum AgentEvent {
    Probe,
    Connectivity(bool),
    Snapshot(Option<Vec<RemoteDoc>>),
}

/// Background task that replays the queue on every offline → online
/// transition and merges every snapshot of the store's sales.
///
/// ```text
///   probe tick ──► Connectivity::is_online ──┐
///                                            ▼
///   offline ──► online : replay_pending, subscribe to sales
///   online ──► offline : drop subscription
///   snapshot           : on_snapshot
/// ```
pub struct ReconcileAgent {
    reconciler: Reconciler,
    ctx: SessionContext,
    probe_interval: Duration,
    status: Arc<RwLock<AgentStatus>>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl ReconcileAgent {
    pub fn new(
        reconciler: Reconciler,
        ctx: SessionContext,
        probe_interval: Duration,
    ) -> (Self, ReconcileAgentHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let status = Arc::new(RwLock::new(AgentStatus::default()));

        let agent = ReconcileAgent {
            reconciler,
            ctx,
            probe_interval,
            status: status.clone(),
            shutdown_rx,
        };
        (agent, ReconcileAgentHandle { status, shutdown_tx })
    }

    /// Runs until shutdown. Spawn it as a background task.
    pub async fn run(mut self) {
        info!(store = %self.ctx.store, "Reconcile agent starting");

        let mut online_rx = self.reconciler.connectivity().subscribe();
        let mut interval = tokio::time::interval(self.probe_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut subscription: Option<Subscription> = None;
        let mut was_online = false;

        loop {
            let event = tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Reconcile agent shutting down");
                    break;
                }
                _ = interval.tick() => AgentEvent::Probe,
                changed = online_rx.changed() => match changed {
                    Ok(()) => AgentEvent::Connectivity(*online_rx.borrow_and_update()),
                    Err(_) => AgentEvent::Probe,
                },
                snapshot = next_snapshot(&mut subscription) => AgentEvent::Snapshot(snapshot),
            };

            match event {
                AgentEvent::Probe => {
                    let online = self.reconciler.connectivity().is_online().await;
                    self.on_connectivity(online, &mut was_online, &mut subscription)
                        .await;
                }
                AgentEvent::Connectivity(online) => {
                    self.on_connectivity(online, &mut was_online, &mut subscription)
                        .await;
                }
                AgentEvent::Snapshot(Some(docs)) => self.on_snapshot(&docs).await,
                AgentEvent::Snapshot(None) => {
                    warn!("Sales subscription closed");
                    subscription = None;
                    was_online = false;
                }
            }
        }

        self.status.write().await.online = false;
        info!("Reconcile agent stopped");
    }

    async fn on_connectivity(
        &self,
        online: bool,
        was_online: &mut bool,
        subscription: &mut Option<Subscription>,
    ) {
        self.status.write().await.online = online;

        if !online {
            if *was_online {
                info!(store = %self.ctx.store, "Went offline, queueing locally");
            }
            *subscription = None;
            *was_online = false;
            return;
        }
        if *was_online {
            return;
        }

        match self.reconciler.replay_pending(&self.ctx).await {
            Ok(report) => {
                let mut status = self.status.write().await;
                status.replays += 1;
                status.last_replay = Some(Utc::now());
                status.last_error = report
                    .failed
                    .first()
                    .map(|(id, e)| format!("queued sale {}: {}", id, e));
                status.last_report = Some(report);
            }
            Err(e) => {
                error!(store = %self.ctx.store, error = %e, "Replay failed");
                self.status.write().await.last_error = Some(e.to_string());
                return;
            }
        }

        let filter = Filter::all().eq("store", self.ctx.store.as_str());
        match self.reconciler.remote().subscribe(Collection::Sales, filter).await {
            Ok(sub) => {
                *subscription = Some(sub);
                *was_online = true;
            }
            Err(e) => {
                warn!(store = %self.ctx.store, error = %e, "Sales subscription failed");
                self.status.write().await.last_error = Some(e.to_string());
            }
        }
    }

    async fn on_snapshot(&self, docs: &[RemoteDoc]) {
        let result = match remote::decode_all::<Sale>(docs) {
            Ok(sales) => self.reconciler.on_snapshot(&self.ctx, &sales).await.map(|_| ()),
            Err(e) => Err(e),
        };

        let mut status = self.status.write().await;
        status.snapshots += 1;
        if let Err(e) = result {
            warn!(store = %self.ctx.store, error = %e, "Snapshot merge failed");
            status.last_error = Some(e.to_string());
        }
    }
}

async fn next_snapshot(subscription: &mut Option<Subscription>) -> Option<Vec<RemoteDoc>> {
    match subscription {
        Some(sub) => sub.next().await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sales::SubmitOutcome;
    use crate::testing::{draft, harness, harness_with_policy, seed_product, stock};
    use banz_core::{LineItem, Money, Payment, PaymentMethod, RecordId};

    async fn go_offline_with_products(h: &crate::testing::Harness) {
        h.services.inventory.products(&h.ctx.store).await.unwrap();
        h.remote.set_available(false);
    }

    #[tokio::test]
    async fn test_offline_sale_is_created_once() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 5, 600, 900).await;
        go_offline_with_products(&h).await;

        let outcome = h
            .services
            .sales
            .submit_with_correlation(
                &h.ctx,
                &draft(&[("Caderno", 2)], &[(PaymentMethod::Cash, 1800)]),
                "X".to_string(),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Queued(_)));

        // Still offline: nothing happens, however often it runs
        let reconciler = &h.services.reconciler;
        assert!(reconciler.replay_pending(&h.ctx).await.unwrap().is_empty());
        assert!(reconciler.replay_pending(&h.ctx).await.unwrap().is_empty());

        h.remote.set_available(true);
        let first = reconciler.replay_pending(&h.ctx).await.unwrap();
        let second = reconciler.replay_pending(&h.ctx).await.unwrap();
        assert_eq!(first.created, 1);
        assert!(second.is_empty());

        let sales: Vec<Sale> = remote::find(
            h.remote.as_ref(),
            &Filter::all().eq("correlation_id", "X"),
        )
        .await
        .unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 3);
        assert_eq!(h.db.pending_queue().count("Socorro", QueueKind::Sales).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failing_entry_does_not_block_the_rest_of_the_queue() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 5, 600, 900).await;
        seed_product(h.remote.as_ref(), "Socorro", "Lapis", 10, 100, 200).await;
        go_offline_with_products(&h).await;

        let sales = &h.services.sales;
        sales
            .submit(&h.ctx, &draft(&[("Caderno", 1)], &[(PaymentMethod::Cash, 900)]))
            .await
            .unwrap();
        sales
            .submit(&h.ctx, &draft(&[("Lapis", 2)], &[(PaymentMethod::Pix, 400)]))
            .await
            .unwrap();

        h.remote.set_available(true);
        h.services.inventory.delete_product(&h.ctx, "Caderno").await.unwrap();

        let reconciler = &h.services.reconciler;
        let first = reconciler.replay_pending(&h.ctx).await.unwrap();
        assert_eq!(first.created, 1);
        assert_eq!(first.failed.len(), 1);
        assert!(first.failed[0].1.contains("Caderno"));

        // The stuck entry is retried, the written one is not
        let second = reconciler.replay_pending(&h.ctx).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.failed.len(), 1);

        let written: Vec<Sale> = remote::find(h.remote.as_ref(), &Filter::all()).await.unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].items[0].product_name, "Lapis");
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Lapis").await, 8);
        assert_eq!(h.db.pending_queue().count("Socorro", QueueKind::Sales).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejected_write_stays_queued_until_it_succeeds() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 5, 600, 900).await;
        go_offline_with_products(&h).await;
        h.services
            .sales
            .submit(&h.ctx, &draft(&[("Caderno", 1)], &[(PaymentMethod::Cash, 900)]))
            .await
            .unwrap();

        h.remote.set_available(true);
        h.remote.fail_writes(Collection::Sales).await;
        let report = h.services.reconciler.replay_pending(&h.ctx).await.unwrap();
        assert_eq!(report.failed.len(), 1);

        h.remote.clear_failures().await;
        let report = h.services.reconciler.replay_pending(&h.ctx).await.unwrap();
        assert_eq!(report.created, 1);
        assert!(report.failed.is_empty());
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 4);
    }

    #[tokio::test]
    async fn test_entry_left_behind_matches_by_correlation_id() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 5, 600, 900).await;
        go_offline_with_products(&h).await;

        let queued = h
            .services
            .sales
            .submit(&h.ctx, &draft(&[("Caderno", 1)], &[(PaymentMethod::Pix, 800)]))
            .await
            .unwrap();

        // The write went through earlier but the entry was never purged
        h.remote.set_available(true);
        let mut written = queued.sale().clone();
        written.id = RecordId::Remote(String::new());
        remote::insert(h.remote.as_ref(), &written).await.unwrap();

        let report = h.services.reconciler.replay_pending(&h.ctx).await.unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(report.created, 0);
        assert_eq!(h.remote.len(Collection::Sales).await, 1);
    }

    fn legacy_sale(id: RecordId) -> Sale {
        Sale {
            id,
            correlation_id: None,
            store: "Socorro".to_string(),
            seller: "ryan".to_string(),
            items: vec![LineItem::new("Caderno", 1)],
            payments: vec![Payment::new(PaymentMethod::Cash, Money::from_cents(800))],
            note: Some(String::new()),
            timestamp: Utc::now(),
            below_minimum_alert: false,
            version: 0,
        }
    }

    #[tokio::test]
    async fn test_legacy_entry_matches_only_when_enabled() {
        for (policy, expected_created) in [(MatchPolicy::default(), 0), (MatchPolicy::strict(), 1)] {
            let h = harness_with_policy(policy).await;
            seed_product(h.remote.as_ref(), "Socorro", "Caderno", 5, 600, 900).await;

            let mut remote_copy = legacy_sale(RecordId::Remote(String::new()));
            remote_copy.note = None;
            remote::insert(h.remote.as_ref(), &remote_copy).await.unwrap();

            let local = legacy_sale(RecordId::new_local());
            h.db
                .pending_queue()
                .enqueue("Socorro", QueueKind::Sales, &PendingEntry::new(local.id.as_str(), local.clone()))
                .await
                .unwrap();

            let report = h.services.reconciler.replay_pending(&h.ctx).await.unwrap();
            assert_eq!(report.created, expected_created);
            assert_eq!(h.remote.len(Collection::Sales).await, 1 + expected_created);
        }
    }

    #[tokio::test]
    async fn test_snapshot_marks_pending_edit_synced_then_replay_applies_it() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 5, 600, 900).await;
        go_offline_with_products(&h).await;

        let queued = h
            .services
            .sales
            .submit_with_correlation(
                &h.ctx,
                &draft(&[("Caderno", 1)], &[(PaymentMethod::Cash, 800)]),
                "E".to_string(),
            )
            .await
            .unwrap();
        let local_id = queued.sale().id.clone();

        // Another path already wrote and debited the original
        h.remote.set_available(true);
        let mut written = queued.sale().clone();
        written.id = RecordId::Remote(String::new());
        let written = remote::insert(h.remote.as_ref(), &written).await.unwrap();
        h.services
            .inventory
            .adjust_stock("Socorro", "Caderno", -1)
            .await
            .unwrap();
        h.remote.set_available(false);

        h.services
            .sales
            .edit_sale(&h.ctx, &local_id, &draft(&[("Caderno", 3)], &[(PaymentMethod::Cash, 2400)]))
            .await
            .unwrap();

        h.remote.set_available(true);
        let snapshot = vec![written.clone()];
        let outcome = h.services.reconciler.on_snapshot(&h.ctx, &snapshot).await.unwrap();
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.sales.len(), 1);

        let entry = h
            .db
            .pending_queue()
            .get::<Sale>("Socorro", QueueKind::Sales, local_id.as_str())
            .await
            .unwrap()
            .unwrap();
        assert!(entry.synced);

        // Same snapshot again changes nothing
        let again = h.services.reconciler.on_snapshot(&h.ctx, &snapshot).await.unwrap();
        assert!(again.matched.is_empty());

        let report = h.services.reconciler.replay_pending(&h.ctx).await.unwrap();
        assert_eq!(report.edited, 1);
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 2);

        let stored: Sale = remote::fetch(h.remote.as_ref(), written.id.as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.items[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_queued_delete_of_synced_sale_restores_stock() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 5, 600, 900).await;
        go_offline_with_products(&h).await;

        let queued = h
            .services
            .sales
            .submit(&h.ctx, &draft(&[("Caderno", 2)], &[(PaymentMethod::Cash, 1800)]))
            .await
            .unwrap();
        h.remote.set_available(true);
        h.services.reconciler.replay_pending(&h.ctx).await.unwrap();
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 3);

        let remote_sale = h.services.sales.list_sales(&h.ctx).await.unwrap().remove(0);
        assert_eq!(remote_sale.correlation_id, queued.sale().correlation_id);

        h.services.sales.delete_sale(&h.ctx, &remote_sale.id).await.unwrap();
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 5);
        assert_eq!(h.remote.len(Collection::Sales).await, 0);
    }

    #[tokio::test]
    async fn test_deleted_before_sync_never_reaches_remote() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 5, 600, 900).await;
        go_offline_with_products(&h).await;

        let queued = h
            .services
            .sales
            .submit(&h.ctx, &draft(&[("Caderno", 2)], &[(PaymentMethod::Cash, 1800)]))
            .await
            .unwrap();
        h.services.sales.delete_sale(&h.ctx, &queued.sale().id).await.unwrap();

        h.remote.set_available(true);
        let report = h.services.reconciler.replay_pending(&h.ctx).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(h.remote.len(Collection::Sales).await, 0);
        assert_eq!(stock(h.remote.as_ref(), "Socorro", "Caderno").await, 5);
    }

    #[tokio::test]
    async fn test_agent_replays_on_reconnect() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 5, 600, 900).await;
        go_offline_with_products(&h).await;

        h.services
            .sales
            .submit(&h.ctx, &draft(&[("Caderno", 1)], &[(PaymentMethod::Cash, 800)]))
            .await
            .unwrap();

        let (agent, handle) = ReconcileAgent::new(
            h.services.reconciler.clone(),
            h.ctx.clone(),
            Duration::from_millis(10),
        );
        let task = tokio::spawn(agent.run());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.status().await.online);

        h.remote.set_available(true);
        let mut replayed = false;
        for _ in 0..200 {
            let status = handle.status().await;
            if status.last_report.as_ref().map(|r| r.created) == Some(1) {
                replayed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(replayed);
        assert_eq!(h.remote.len(Collection::Sales).await, 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
