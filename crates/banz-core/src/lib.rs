//! # banz-core: Pure Business Logic for Banz POS
//!
//! Domain types and every calculation the workflows rely on, as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Banz POS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/banz-cli                                │   │
//! │  │    sell, sync, close-day, products, transfer, admin ...         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    banz-sync (workflows)                        │   │
//! │  │    SaleService, Reconciler, CloseoutService, Inventory ...      │   │
//! │  └──────────────┬──────────────────────────────┬───────────────────┘   │
//! │                 │                              │                        │
//! │  ┌──────────────▼───────────────┐  ┌───────────▼───────────────────┐   │
//! │  │  ★ banz-core (THIS CRATE) ★  │  │  banz-db (SQLite)             │   │
//! │  │  types  money  validation    │  │  queue, mirror cache,         │   │
//! │  │  totals  reconcile           │  │  session, documents           │   │
//! │  │  NO I/O • PURE FUNCTIONS     │  │                               │   │
//! │  └──────────────────────────────┘  └───────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Sale, Product, Closure, PendingEntry, ...)
//! - [`money`] - Money in integer centavos
//! - [`error`] - Domain error types
//! - [`validation`] - Input and stock checks
//! - [`totals`] - Closeout totals, minimum-price check, day grouping
//! - [`reconcile`] - Matching local sales to remote sales
//!
//! ## Example Usage
//!
//! ```rust
//! use banz_core::money::Money;
//! use banz_core::totals::is_below_minimum;
//!
//! // 2 × Caderno at a R$ 6,00 minimum, paid R$ 10,00
//! let minimum = Money::from_cents(600) * 2;
//! assert!(is_below_minimum(Money::from_cents(1000), minimum));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod reconcile;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distance between two timestamps for the legacy match heuristic.
pub const LEGACY_MATCH_WINDOW_MS: i64 = 60_000;

/// Maximum quantity on a single line item.
///
/// Catches typos like 1000 instead of 10 on sales and stock entries.
pub const MAX_ITEM_QUANTITY: i64 = 10_000;

/// Maximum payment amount or product price, in centavos (R$ 10.000.000,00).
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000;

/// Maximum length of store, employee and product names.
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum length of a sale note.
pub const MAX_NOTE_LENGTH: usize = 500;
