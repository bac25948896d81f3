//! # Reconciliation Matching
//!
//! Pure matching of locally known sales against remote-confirmed sales.
//! The async side (queue purging, replay, mirror rewrite) lives in
//! `banz-sync`; everything here is deterministic and side-effect free.
//!
//! ## Matching Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  local has correlation_id?                                              │
//! │     │                                                                   │
//! │     ├── yes ──► remote with the same correlation_id                     │
//! │     │                                                                   │
//! │     └── no (legacy) ──► only if policy.legacy is on:                    │
//! │                          remote without correlation_id AND              │
//! │                          seller, store equal AND                        │
//! │                          items, payments equal (order-sensitive) AND    │
//! │                          note equal (absent == "") AND                  │
//! │                          |Δ timestamp| < policy.window_ms               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Idempotence
//! `merge_snapshot` applied to its own output and the same remote snapshot
//! returns the same list: matched locals are gone, unmatched locals stay,
//! and remote records win on id collisions.

use std::collections::HashMap;

use crate::types::Sale;
use crate::LEGACY_MATCH_WINDOW_MS;

// =============================================================================
// Policy
// =============================================================================

/// Controls the fallback heuristic for records without a correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    /// Allow the field-equality heuristic for legacy records.
    pub legacy: bool,
    /// Maximum timestamp distance for a legacy match, in milliseconds.
    pub window_ms: i64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        MatchPolicy {
            legacy: true,
            window_ms: LEGACY_MATCH_WINDOW_MS,
        }
    }
}

impl MatchPolicy {
    /// Correlation ids only.
    pub fn strict() -> Self {
        MatchPolicy {
            legacy: false,
            ..Default::default()
        }
    }
}

// =============================================================================
// Matching
// =============================================================================

/// Field-equality heuristic for two sales that both lack a correlation id.
pub fn legacy_match(local: &Sale, remote: &Sale, window_ms: i64) -> bool {
    if local.correlation_id.is_some() || remote.correlation_id.is_some() {
        return false;
    }

    let delta_ms = (local.timestamp - remote.timestamp).num_milliseconds().abs();

    local.seller == remote.seller
        && local.store == remote.store
        && local.items == remote.items
        && local.payments == remote.payments
        && local.note_or_empty() == remote.note_or_empty()
        && delta_ms < window_ms
}

/// Finds the remote counterpart of a local sale.
pub fn find_match<'a>(local: &Sale, remotes: &'a [Sale], policy: MatchPolicy) -> Option<&'a Sale> {
    match &local.correlation_id {
        Some(correlation) => remotes
            .iter()
            .find(|r| r.correlation_id.as_deref() == Some(correlation.as_str())),
        None if policy.legacy => remotes
            .iter()
            .find(|r| legacy_match(local, r, policy.window_ms)),
        None => None,
    }
}

// =============================================================================
// Snapshot Merge
// =============================================================================

/// Result of merging a remote snapshot into the local view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Sales to render, newest first.
    pub sales: Vec<Sale>,
    /// `(local id, remote id)` pairs whose remote counterpart was found.
    pub matched: Vec<(String, String)>,
}

/// Merges a remote snapshot with the locally known sales.
///
/// - Remote sales are authoritative and always included.
/// - Local-id sales with a remote counterpart are dropped and reported in
///   `matched`; unmatched ones stay visible.
/// - Remote-id sales absent from the snapshot were deleted or archived
///   elsewhere and are dropped.
/// - The result is deduplicated by id, keeping the newest timestamp.
pub fn merge_snapshot(local: &[Sale], remote: &[Sale], policy: MatchPolicy) -> MergeOutcome {
    let mut sales: Vec<Sale> = remote.to_vec();
    let mut matched = Vec::new();

    for sale in local.iter().filter(|s| s.is_local()) {
        match find_match(sale, remote, policy) {
            Some(found) => {
                let remote_id = found.id.as_str().to_string();
                matched.push((sale.id.as_str().to_string(), remote_id));
            }
            None => sales.push(sale.clone()),
        }
    }

    MergeOutcome {
        sales: dedup_latest(sales),
        matched,
    }
}

/// Deduplicates by id, keeping the most recent timestamp on collision.
///
/// Output is ordered newest first; ties keep their first occurrence.
pub fn dedup_latest(sales: Vec<Sale>) -> Vec<Sale> {
    let mut by_id: HashMap<_, usize> = HashMap::new();
    let mut out: Vec<Sale> = Vec::with_capacity(sales.len());

    for sale in sales {
        match by_id.get(&sale.id) {
            Some(&idx) => {
                if sale.timestamp > out[idx].timestamp {
                    out[idx] = sale;
                }
            }
            None => {
                by_id.insert(sale.id.clone(), out.len());
                out.push(sale);
            }
        }
    }

    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    out
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::{LineItem, Payment, PaymentMethod, RecordId};
    use chrono::{Duration, TimeZone, Utc};

    fn base(id: RecordId, correlation: Option<&str>) -> Sale {
        Sale {
            id,
            correlation_id: correlation.map(str::to_string),
            store: "Socorro".to_string(),
            seller: "ryan".to_string(),
            items: vec![LineItem::new("Caderno", 2)],
            payments: vec![Payment::new(PaymentMethod::Cash, Money::from_cents(1000))],
            note: None,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            below_minimum_alert: false,
            version: 0,
        }
    }

    fn local(id: &str, correlation: Option<&str>) -> Sale {
        base(RecordId::Local(id.to_string()), correlation)
    }

    fn remote(id: &str, correlation: Option<&str>) -> Sale {
        base(RecordId::Remote(id.to_string()), correlation)
    }

    #[test]
    fn test_match_by_correlation_id() {
        let remotes = vec![remote("r1", Some("other")), remote("r2", Some("X"))];
        let found = find_match(&local("l1", Some("X")), &remotes, MatchPolicy::default());
        assert_eq!(found.map(|s| s.id.as_str()), Some("r2"));
    }

    #[test]
    fn test_correlated_local_never_matches_legacy_remote() {
        let remotes = vec![remote("r1", None)];
        assert!(find_match(&local("l1", Some("X")), &remotes, MatchPolicy::default()).is_none());
    }

    #[test]
    fn test_legacy_heuristic() {
        let l = local("l1", None);
        let mut r = remote("r1", None);
        r.timestamp = l.timestamp + Duration::seconds(59);
        r.note = Some(String::new());

        assert!(legacy_match(&l, &r, LEGACY_MATCH_WINDOW_MS));
        assert_eq!(
            find_match(&l, std::slice::from_ref(&r), MatchPolicy::default()).map(|s| s.id.as_str()),
            Some("r1")
        );
        assert!(find_match(&l, &[r], MatchPolicy::strict()).is_none());
    }

    #[test]
    fn test_legacy_heuristic_rejects_outside_window() {
        let l = local("l1", None);
        let mut r = remote("r1", None);
        r.timestamp = l.timestamp + Duration::milliseconds(LEGACY_MATCH_WINDOW_MS);
        assert!(!legacy_match(&l, &r, LEGACY_MATCH_WINDOW_MS));
    }

    #[test]
    fn test_legacy_heuristic_rejects_field_differences() {
        let l = local("l1", None);

        let mut r = remote("r1", None);
        r.seller = "ana".to_string();
        assert!(!legacy_match(&l, &r, LEGACY_MATCH_WINDOW_MS));

        let mut r = remote("r1", None);
        r.items = vec![LineItem::new("Caderno", 3)];
        assert!(!legacy_match(&l, &r, LEGACY_MATCH_WINDOW_MS));

        let mut r = remote("r1", None);
        r.payments = vec![Payment::new(PaymentMethod::Pix, Money::from_cents(1000))];
        assert!(!legacy_match(&l, &r, LEGACY_MATCH_WINDOW_MS));

        let mut r = remote("r1", None);
        r.note = Some("troco".to_string());
        assert!(!legacy_match(&l, &r, LEGACY_MATCH_WINDOW_MS));
    }

    #[test]
    fn test_merge_snapshot_replaces_matched_locals() {
        let locals = vec![local("l1", Some("X")), local("l2", Some("Y"))];
        let remotes = vec![remote("r1", Some("X"))];

        let outcome = merge_snapshot(&locals, &remotes, MatchPolicy::default());

        assert_eq!(outcome.matched, vec![("l1".to_string(), "r1".to_string())]);
        let ids: Vec<_> = outcome.sales.iter().map(|s| s.id.clone()).collect();
        assert!(ids.contains(&RecordId::Remote("r1".to_string())));
        assert!(ids.contains(&RecordId::Local("l2".to_string())));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_merge_snapshot_drops_remote_ids_missing_from_snapshot() {
        let locals = vec![remote("gone", Some("G"))];
        let outcome = merge_snapshot(&locals, &[], MatchPolicy::default());
        assert!(outcome.sales.is_empty());
    }

    #[test]
    fn test_merge_snapshot_is_idempotent() {
        let locals = vec![local("l1", Some("X")), local("l2", Some("Y")), local("l3", None)];
        let remotes = vec![remote("r1", Some("X")), remote("r9", Some("Z"))];

        let first = merge_snapshot(&locals, &remotes, MatchPolicy::default());
        let second = merge_snapshot(&first.sales, &remotes, MatchPolicy::default());

        assert_eq!(first.sales, second.sales);
        assert!(second.matched.is_empty());
    }

    #[test]
    fn test_dedup_keeps_latest() {
        let older = remote("r1", Some("X"));
        let mut newer = remote("r1", Some("X"));
        newer.timestamp = older.timestamp + Duration::minutes(5);
        newer.note = Some("editada".to_string());
        let other = remote("r2", Some("Y"));

        let out = dedup_latest(vec![older, other, newer]);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id.as_str(), "r1");
        assert_eq!(out[0].note.as_deref(), Some("editada"));
    }
}
