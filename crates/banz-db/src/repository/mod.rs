//! # Repository Module
//!
//! Repository implementations over the local SQLite file.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Workflow (banz-sync)                                                   │
//! │       │                                                                 │
//! │       │  db.pending_queue().enqueue(store, QueueKind::Sales, &entry)   │
//! │       ▼                                                                 │
//! │  PendingQueueRepository                                                 │
//! │  ├── enqueue / list_pending / get                                      │
//! │  ├── mark_synced / mark_deleted / mark_edited                          │
//! │  └── remove / count                                                    │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`PendingQueueRepository`] - Durable queue of offline writes
//! - [`MirrorCacheRepository`] - Last-known-good lists per store
//! - [`SessionRepository`] - Selected store and operator
//! - [`DocumentRepository`] - Versioned JSON documents by collection

pub mod document;
pub mod mirror;
pub mod pending;
pub mod session;

pub use document::{Document, DocumentRepository};
pub use mirror::{MirrorCacheRepository, MirrorKind};
pub use pending::PendingQueueRepository;
pub use session::{SessionRepository, StoredSession};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::error::{DbError, DbResult};

/// Shallow merge: every top-level key of `patch` replaces the one in
/// `target`. Non-object patches replace the whole value.
pub(crate) fn merge_patch(target: &mut Value, patch: &Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target), Some(patch)) => {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        _ => *target = patch.clone(),
    }
}

/// Timestamps are stored as fixed-width RFC 3339 text so they sort
/// lexicographically.
pub(crate) fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_time(raw: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DbError::Serialization(format!("bad timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_merge_patch_replaces_top_level_keys() {
        let mut target = json!({"note": "a", "items": [1], "seller": "ryan"});
        merge_patch(&mut target, &json!({"note": "b", "items": [2, 3]}));
        assert_eq!(target, json!({"note": "b", "items": [2, 3], "seller": "ryan"}));
    }

    #[test]
    fn test_time_encoding_round_trips_and_sorts() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();

        assert_eq!(decode_time(&encode_time(early)).unwrap(), early);
        assert!(encode_time(early) < encode_time(late));
        assert!(decode_time("yesterday").is_err());
    }
}
