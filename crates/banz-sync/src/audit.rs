//! # Audit Log
//!
//! Every mutating workflow leaves a line in the `logs` collection. Writing
//! the line is best effort: a failure is logged and never undoes or fails
//! the operation it describes.

use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use banz_core::{AuditAction, AuditEntry, SessionContext};

use crate::error::SyncResult;
use crate::remote::{self, Filter, RemoteStore};

/// Criteria for listing audit entries. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub store: Option<String>,
    pub action: Option<AuditAction>,
    /// Calendar day (UTC) of the entry.
    pub date: Option<NaiveDate>,
}

#[derive(Clone)]
pub struct AuditLogger {
    remote: Arc<dyn RemoteStore>,
}

impl AuditLogger {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        AuditLogger { remote }
    }

    /// Appends an entry. Never fails.
    pub async fn record(
        &self,
        ctx: &SessionContext,
        action: AuditAction,
        target: impl Into<String>,
        details: impl Into<String>,
    ) {
        let entry = AuditEntry {
            id: String::new(),
            action,
            target: target.into(),
            operator: ctx.operator.clone(),
            store: ctx.store.clone(),
            details: details.into(),
            timestamp: Utc::now(),
        };

        if let Err(e) = remote::insert(self.remote.as_ref(), &entry).await {
            warn!(
                action = %action,
                target = %entry.target,
                error = %e,
                "Audit entry not written"
            );
        }
    }

    /// Matching entries, newest first.
    pub async fn list(&self, filter: &AuditFilter) -> SyncResult<Vec<AuditEntry>> {
        let mut query = Filter::all();
        if let Some(store) = &filter.store {
            query = query.eq("store", store.as_str());
        }
        if let Some(action) = filter.action {
            query = query.eq("action", json!(action.as_str()));
        }

        let mut entries: Vec<AuditEntry> = remote::find(self.remote.as_ref(), &query).await?;
        if let Some(date) = filter.date {
            entries.retain(|e| e.timestamp.date_naive() == date);
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{Collection, MemoryRemoteStore};

    #[tokio::test]
    async fn test_record_and_filter() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let audit = AuditLogger::new(remote.clone());
        let socorro = SessionContext::new("Socorro", "ryan");
        let centro = SessionContext::new("Centro", "ana");

        audit
            .record(&socorro, AuditAction::SaleRecorded, "v1", "R$ 8,00")
            .await;
        audit
            .record(&socorro, AuditAction::ProductAdded, "Caderno", "")
            .await;
        audit
            .record(&centro, AuditAction::SaleRecorded, "v2", "R$ 3,00")
            .await;

        let all = audit.list(&AuditFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        let mut targets: Vec<&str> = all.iter().map(|e| e.target.as_str()).collect();
        targets.sort();
        assert_eq!(targets, ["Caderno", "v1", "v2"]);

        let sales_in_socorro = audit
            .list(&AuditFilter {
                store: Some("Socorro".to_string()),
                action: Some(AuditAction::SaleRecorded),
                date: None,
            })
            .await
            .unwrap();
        assert_eq!(sales_in_socorro.len(), 1);
        assert_eq!(sales_in_socorro[0].operator, "ryan");

        let yesterday = Utc::now().date_naive().pred_opt().unwrap();
        let none = audit
            .list(&AuditFilter {
                date: Some(yesterday),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_is_swallowed() {
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.fail_writes(Collection::Logs).await;
        let audit = AuditLogger::new(remote.clone());

        audit
            .record(&SessionContext::new("Socorro", "ryan"), AuditAction::Transfer, "x", "")
            .await;
        assert_eq!(remote.len(Collection::Logs).await, 0);
    }
}
