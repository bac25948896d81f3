//! # banz-db: Local Persistence for Banz POS
//!
//! SQLite storage for everything the device keeps on its own: the durable
//! queue of offline writes, the mirror cache, the session, and a versioned
//! JSON document table.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Banz POS Data Flow                               │
//! │                                                                         │
//! │  banz-sync workflow (SaleService::submit)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     banz-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌─────────────────────┐  ┌────────────┐ │   │
//! │  │   │   Database    │    │    Repositories     │  │ Migrations │ │   │
//! │  │   │   (pool.rs)   │    │                     │  │ (embedded) │ │   │
//! │  │   │               │    │ PendingQueueRepo    │  │            │ │   │
//! │  │   │ SqlitePool    │◄───│ MirrorCacheRepo     │  │ 001_init   │ │   │
//! │  │   │               │    │ SessionRepo         │  │            │ │   │
//! │  │   │               │    │ DocumentRepo        │  │            │ │   │
//! │  │   └───────────────┘    └─────────────────────┘  └────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   SQLite: <data dir>/local.db   (and remote.db for documents)   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use banz_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/local.db")).await?;
//!
//! let waiting = db.pending_queue().count("Banca Socorro", QueueKind::Sales).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::document::{Document, DocumentRepository};
pub use repository::mirror::{MirrorCacheRepository, MirrorKind};
pub use repository::pending::PendingQueueRepository;
pub use repository::session::{SessionRepository, StoredSession};
