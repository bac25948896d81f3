//! # Backup Export
//!
//! Dumps every remote collection into one JSON file:
//!
//! ```text
//! <export_dir>/backup-2024-01-02.json
//! {
//!   "lojas":   [ { "id": "...", "name": "Socorro" } ],
//!   "vendas":  [ ... ],
//!   ...
//! }
//! ```
//!
//! There is no import counterpart.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::error::{SyncError, SyncResult};
use crate::remote::{Collection, Filter, RemoteStore};

#[derive(Clone)]
pub struct Exporter {
    remote: Arc<dyn RemoteStore>,
    dir: PathBuf,
}

impl Exporter {
    pub fn new(remote: Arc<dyn RemoteStore>, dir: impl Into<PathBuf>) -> Self {
        Exporter {
            remote,
            dir: dir.into(),
        }
    }

    /// Path the backup for `date` is written to.
    pub fn backup_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("backup-{}.json", date.format("%Y-%m-%d")))
    }

    /// Writes every collection to the backup file for `date`, replacing
    /// an earlier backup of the same day.
    pub async fn export_all(&self, date: NaiveDate) -> SyncResult<PathBuf> {
        let mut snapshot = Map::new();
        let mut documents = 0;

        for collection in Collection::ALL {
            let docs = self.remote.query(collection, &Filter::all()).await?;
            documents += docs.len();
            let records: Vec<Value> = docs.iter().map(|d| d.to_export()).collect();
            snapshot.insert(collection.name().to_string(), Value::Array(records));
        }

        let path = self.backup_path(date);
        let contents = serde_json::to_string_pretty(&Value::Object(snapshot))?;

        fs::create_dir_all(&self.dir).map_err(|e| {
            SyncError::ExportFailed(format!("{}: {}", self.dir.display(), e))
        })?;
        fs::write(&path, contents)
            .map_err(|e| SyncError::ExportFailed(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), documents, "Backup exported");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_export_writes_every_collection() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let store = remote
            .create(Collection::Stores, json!({"name": "Socorro"}))
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(remote.clone(), dir.path().join("backups"));
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        let path = exporter.export_all(date).await.unwrap();
        assert!(path.ends_with("backup-2024-01-02.json"));

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let obj = written.as_object().unwrap();
        assert_eq!(obj.len(), Collection::ALL.len());
        assert_eq!(written["lojas"][0]["id"], json!(store.id));
        assert_eq!(written["lojas"][0]["name"], "Socorro");
        assert_eq!(written["vendas"], json!([]));
    }

    #[tokio::test]
    async fn test_unreachable_remote_fails_export() {
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.set_available(false);
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(remote, dir.path());

        let err = exporter
            .export_all(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable));
    }
}
