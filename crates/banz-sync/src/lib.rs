//! # banz-sync: Workflows for Banz POS
//!
//! Everything that reads or writes the remote document store: sales with
//! an offline queue, reconciliation on reconnect, closeouts, inventory,
//! the audit log, backups, administration and sessions.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          BanzServices                                   │
//! │                                                                         │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────────┐    │
//! │  │ SaleService  │   │ Reconciler   │   │ CloseoutService          │    │
//! │  │              │   │ + Agent      │   │                          │    │
//! │  │ online:      │   │              │   │ auto_close / close_day   │    │
//! │  │  write+debit │   │ replay queue │   │ closure edits            │    │
//! │  │ offline:     │──►│ on reconnect │   │ export after close       │    │
//! │  │  queue local │   │ merge snaps  │   │                          │    │
//! │  └──────┬───────┘   └──────┬───────┘   └────────────┬─────────────┘    │
//! │         │                  │                        │                   │
//! │  ┌──────▼──────────────────▼────────────────────────▼─────────────┐    │
//! │  │ InventoryService (CAS stock)   AuditLogger   Connectivity       │    │
//! │  └──────┬────────────────────────────────────────────┬────────────┘    │
//! │         │                                            │                  │
//! │  ┌──────▼──────────────────────┐   ┌─────────────────▼──────────────┐  │
//! │  │ RemoteStore (trait)         │   │ banz-db                        │  │
//! │  │ Memory / SQLite             │   │ queue · mirror · session       │  │
//! │  └─────────────────────────────┘   └────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`remote`] - Remote store trait, collections, in-memory and SQLite stores
//! - [`connectivity`] - Online/offline decision with change notifications
//! - [`sales`] - Sale submission, edit, delete, listing
//! - [`reconcile`] - Queue replay, snapshot merge, background agent
//! - [`closeout`] - Daily closures
//! - [`inventory`] - Products, stock adjustment, entries, transfers
//! - [`saga`] - Compensation steps for multi-write workflows
//! - [`audit`] - Audit log
//! - [`export`] - JSON backups
//! - [`admin`] - Stores, employees, admin views
//! - [`auth`] - Passwords and the terminal session
//! - [`prompt`] - Operator confirmations
//! - [`config`] - Configuration
//! - [`error`] - Workflow error types
//!
//! ## Usage
//! ```rust,ignore
//! use banz_sync::{AlwaysConfirm, BanzConfig, BanzServices};
//!
//! let config = BanzConfig::load_or_default(None);
//! let services = BanzServices::open(config, Arc::new(AlwaysConfirm)).await?;
//!
//! let ctx = services.session.current().await?;
//! let outcome = services.sales.submit(&ctx, &draft).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod admin;
pub mod audit;
pub mod auth;
pub mod closeout;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod export;
pub mod inventory;
pub mod prompt;
pub mod reconcile;
pub mod remote;
pub mod saga;
pub mod sales;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use admin::AdminService;
pub use audit::{AuditFilter, AuditLogger};
pub use auth::{hash_password, verify_password, SessionService};
pub use closeout::{CloseDayReport, CloseoutService};
pub use config::{BanzConfig, ConnectivityMode};
pub use connectivity::Connectivity;
pub use error::{SyncError, SyncResult};
pub use export::Exporter;
pub use inventory::{InventoryService, ProductWrite};
pub use prompt::{AlwaysConfirm, DeclineAll, OperatorPrompt};
pub use reconcile::{AgentStatus, ReconcileAgent, ReconcileAgentHandle, Reconciler, ReplayReport};
pub use remote::{Collection, Filter, MemoryRemoteStore, RemoteStore, SqliteRemoteStore};
pub use sales::{SaleService, SubmitOutcome};

use std::sync::Arc;
use tracing::info;

use banz_db::{Database, DbConfig};

// =============================================================================
// Service Wiring
// =============================================================================

/// Every workflow, wired to one local database and one remote store.
///
/// Cloning is cheap; clones share the same connections.
#[derive(Clone)]
pub struct BanzServices {
    pub config: BanzConfig,
    pub db: Database,
    pub remote: Arc<dyn RemoteStore>,
    pub connectivity: Connectivity,
    pub audit: AuditLogger,
    pub inventory: InventoryService,
    pub sales: SaleService,
    pub reconciler: Reconciler,
    pub closeout: CloseoutService,
    pub exporter: Exporter,
    pub session: SessionService,
    pub admin: AdminService,
}

impl BanzServices {
    /// Opens the local database and the SQLite remote store named in the
    /// configuration.
    pub async fn open(config: BanzConfig, prompt: Arc<dyn OperatorPrompt>) -> SyncResult<Self> {
        let db = Database::new(DbConfig::new(config.database.local_path.clone())).await?;
        let remote_db = Database::new(DbConfig::new(config.database.remote_path.clone())).await?;
        let remote: Arc<dyn RemoteStore> = Arc::new(SqliteRemoteStore::new(remote_db));

        info!(
            local = %config.database.local_path.display(),
            remote = %config.database.remote_path.display(),
            mode = %config.mode(),
            "Services opened"
        );
        Ok(Self::with_remote(config, db, remote, prompt))
    }

    /// Wires the services around an already opened database and store.
    pub fn with_remote(
        config: BanzConfig,
        db: Database,
        remote: Arc<dyn RemoteStore>,
        prompt: Arc<dyn OperatorPrompt>,
    ) -> Self {
        let policy = config.match_policy();
        let connectivity = Connectivity::new(config.mode(), remote.clone());
        let audit = AuditLogger::new(remote.clone());
        let exporter = Exporter::new(remote.clone(), config.closeout.export_dir.clone());

        let inventory = InventoryService::new(
            remote.clone(),
            db.clone(),
            audit.clone(),
            connectivity.clone(),
            config.sync.max_version_retries,
        );
        let sales = SaleService::new(
            remote.clone(),
            db.clone(),
            inventory.clone(),
            audit.clone(),
            connectivity.clone(),
            prompt,
            policy,
        );
        let reconciler = Reconciler::new(
            remote.clone(),
            db.clone(),
            sales.clone(),
            inventory.clone(),
            audit.clone(),
            connectivity.clone(),
            policy,
        );
        let closeout = CloseoutService::new(
            remote.clone(),
            inventory.clone(),
            audit.clone(),
            connectivity.clone(),
            exporter.clone(),
        );
        let session = SessionService::new(
            remote.clone(),
            db.clone(),
            connectivity.clone(),
            config.store.default.clone(),
        );
        let admin = AdminService::new(
            remote.clone(),
            inventory.clone(),
            audit.clone(),
            connectivity.clone(),
            config.admin.password_hash.clone(),
        );

        BanzServices {
            config,
            db,
            remote,
            connectivity,
            audit,
            inventory,
            sales,
            reconciler,
            closeout,
            exporter,
            session,
            admin,
        }
    }

    /// Closes the local database pool.
    pub async fn close(&self) {
        self.db.close().await;
    }
}
