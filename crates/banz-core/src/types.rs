//! # Domain Types
//!
//! Core domain types used throughout Banz POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │    Closure      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  id (RecordId)  │   │  id             │       │
//! │  │  name + store   │   │  correlation_id │   │  store + date   │       │
//! │  │  quantity       │   │  items          │   │  sales[]        │       │
//! │  │  min/max price  │   │  payments       │   │  totals         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ PendingEntry<T> │   │ SessionContext  │   │ PaymentMethod   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  pending/synced │   │  store          │   │  Cash           │       │
//! │  │  deleted/edited │   │  operator       │   │  Pix            │       │
//! │  │  remote_id      │   └─────────────────┘   │  Credit, Debit  │       │
//! │  └─────────────────┘                         └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Identifier Spaces
//! A sale recorded offline carries a local id until reconciliation finds
//! (or creates) its remote counterpart. [`RecordId`] keeps the two spaces
//! apart at the type level; the `correlation_id` is the only key shared by
//! both sides.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::money::Money;

/// Generates a fresh UUID v4 string.
///
/// Used for local ids, correlation ids and document ids.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a payment was made.
///
/// Closeouts split totals into cash (counted in the drawer) and everything
/// else (settled by the card machine or Pix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash.
    Cash,
    /// Instant bank transfer.
    Pix,
    /// Credit card on the store's card machine.
    Credit,
    /// Debit card on the store's card machine.
    Debit,
}

impl PaymentMethod {
    /// Every method other than cash counts as electronic.
    #[inline]
    pub fn is_electronic(&self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Pix => "pix",
            PaymentMethod::Credit => "credit",
            PaymentMethod::Debit => "debit",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" | "dinheiro" => Ok(PaymentMethod::Cash),
            "pix" => Ok(PaymentMethod::Pix),
            "credit" | "credito" | "crédito" => Ok(PaymentMethod::Credit),
            "debit" | "debito" | "débito" => Ok(PaymentMethod::Debit),
            _ => Err(ValidationError::NotAllowed {
                field: "payment method".to_string(),
                allowed: vec![
                    "cash".to_string(),
                    "pix".to_string(),
                    "credit".to_string(),
                    "debit".to_string(),
                ],
            }),
        }
    }
}

// =============================================================================
// Line Items & Payments
// =============================================================================

/// One product line of a sale, referenced by product name within the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItem {
    pub product_name: String,
    pub quantity: i64,
}

impl LineItem {
    pub fn new(product_name: impl Into<String>, quantity: i64) -> Self {
        LineItem {
            product_name: product_name.into(),
            quantity,
        }
    }
}

/// A payment towards a sale. A sale can be split across methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Payment {
    pub method: PaymentMethod,
    /// Amount paid in centavos.
    pub amount_cents: i64,
}

impl Payment {
    pub fn new(method: PaymentMethod, amount: Money) -> Self {
        Payment {
            method,
            amount_cents: amount.cents(),
        }
    }

    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Record Identity
// =============================================================================

/// Identifier of a sale in either the local or the remote id space.
///
/// ## Lifecycle
/// ```text
/// submit offline ──► Local("4f1c…") ──► reconcile ──► Remote("Qx81…")
/// submit online  ─────────────────────────────────► Remote("Qx81…")
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "space", content = "value", rename_all = "snake_case")]
pub enum RecordId {
    /// Assigned on this device; meaningless to the remote store.
    Local(String),
    /// Assigned by the remote store.
    Remote(String),
}

impl RecordId {
    /// Creates a new local identifier.
    pub fn new_local() -> Self {
        RecordId::Local(new_id())
    }

    pub fn as_str(&self) -> &str {
        match self {
            RecordId::Local(id) | RecordId::Remote(id) => id,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, RecordId::Local(_))
    }

    /// Returns the remote id, if this is one.
    pub fn remote(&self) -> Option<&str> {
        match self {
            RecordId::Remote(id) => Some(id),
            RecordId::Local(_) => None,
        }
    }
}

/// Local ids render with a `local:` prefix so operators can tell them apart.
impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Local(id) => write!(f, "local:{}", id),
            RecordId::Remote(id) => f.write_str(id),
        }
    }
}

impl FromStr for RecordId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "id".to_string(),
            });
        }
        Ok(match s.strip_prefix("local:") {
            Some(local) => RecordId::Local(local.to_string()),
            None => RecordId::Remote(s.to_string()),
        })
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A recorded sale.
///
/// `correlation_id` is generated on the device before the first write and
/// never changes; at most one remote sale exists per correlation id.
/// Records imported from older installs may lack it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: RecordId,
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub store: String,
    pub seller: String,
    pub items: Vec<LineItem>,
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub note: Option<String>,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub below_minimum_alert: bool,
    /// Remote document version, used for compare-and-set edits.
    #[serde(default)]
    pub version: i64,
}

impl Sale {
    /// Sum of all payments.
    pub fn paid(&self) -> Money {
        self.payments.iter().map(Payment::amount).sum()
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        self.id.is_local()
    }

    /// Note with "absent" and "empty" treated alike.
    pub fn note_or_empty(&self) -> &str {
        self.note.as_deref().unwrap_or("")
    }

    /// Calendar day (UTC) the sale belongs to for closeouts.
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Summed quantity per product name.
    pub fn quantity_by_product(&self) -> BTreeMap<String, i64> {
        let mut out = BTreeMap::new();
        for item in &self.items {
            *out.entry(item.product_name.clone()).or_insert(0) += item.quantity;
        }
        out
    }
}

/// Operator input for a new or edited sale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleDraft {
    pub items: Vec<LineItem>,
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub note: Option<String>,
}

impl SaleDraft {
    pub fn paid(&self) -> Money {
        self.payments.iter().map(Payment::amount).sum()
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product stocked by one store.
///
/// Products are identified by name within a store; sales reference them by
/// name. `quantity` may go negative when the operator overrides a shortfall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub quantity: i64,
    pub min_price_cents: i64,
    pub max_price_cents: i64,
    pub store: String,
    #[serde(default)]
    pub version: i64,
}

impl Product {
    #[inline]
    pub fn min_price(&self) -> Money {
        Money::from_cents(self.min_price_cents)
    }

    #[inline]
    pub fn max_price(&self) -> Money {
        Money::from_cents(self.max_price_cents)
    }
}

/// Operator input for a new or edited product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductDraft {
    pub name: String,
    pub quantity: i64,
    pub min_price_cents: i64,
    pub max_price_cents: i64,
}

// =============================================================================
// Closeout
// =============================================================================

/// Aggregates of a set of sales.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Totals {
    pub total_cents: i64,
    pub cash_cents: i64,
    pub electronic_cents: i64,
    /// Number of sales flagged below minimum price.
    pub alerts: u32,
    /// Product name → summed quantity.
    pub items: BTreeMap<String, i64>,
}

impl Totals {
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    pub fn cash(&self) -> Money {
        Money::from_cents(self.cash_cents)
    }

    pub fn electronic(&self) -> Money {
        Money::from_cents(self.electronic_cents)
    }
}

/// An archived day of sales (fechamento).
///
/// Once written, the archived sales no longer exist in the live collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Closure {
    pub id: String,
    pub store: String,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub sales: Vec<Sale>,
    pub totals: Totals,
    #[serde(default)]
    pub version: i64,
}

// =============================================================================
// Local Queue
// =============================================================================

/// The kinds of record that can wait in the local queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Sales,
    Products,
}

impl QueueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Sales => "sales",
            QueueKind::Products => "products",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record waiting for the remote store.
///
/// ## Lifecycle
/// ```text
/// enqueue ──► pending ──┬──► (edit)   edited = true, record patched
///                       ├──► (delete) deleted = true
///                       ▼
///              remote write confirmed ──► synced = true, remote_id set
///                       │
///                       ▼
///              queued edit/delete replayed ──► removed from queue
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingEntry<T> {
    pub local_id: String,
    pub record: T,
    pub pending: bool,
    pub synced: bool,
    pub deleted: bool,
    pub edited: bool,
    pub remote_id: Option<String>,
    #[ts(as = "String")]
    pub queued_at: DateTime<Utc>,
}

impl<T> PendingEntry<T> {
    /// Wraps a freshly queued record.
    pub fn new(local_id: impl Into<String>, record: T) -> Self {
        PendingEntry {
            local_id: local_id.into(),
            record,
            pending: true,
            synced: false,
            deleted: false,
            edited: false,
            remote_id: None,
            queued_at: Utc::now(),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Store and operator a workflow acts on behalf of.
///
/// Passed explicitly into every workflow; nothing reads it from globals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionContext {
    pub store: String,
    pub operator: String,
}

impl SessionContext {
    pub fn new(store: impl Into<String>, operator: impl Into<String>) -> Self {
        SessionContext {
            store: store.into(),
            operator: operator.into(),
        }
    }
}

// =============================================================================
// Administration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Store {
    pub id: String,
    pub name: String,
}

/// A store employee. Names are stored lower-case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Employee {
    pub id: String,
    pub name: String,
    /// Argon2 PHC string.
    #[ts(skip)]
    pub password_hash: String,
}

// =============================================================================
// Audit Log
// =============================================================================

/// What an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SaleRecorded,
    SaleEdited,
    SaleDeleted,
    ProductAdded,
    ProductEdited,
    ProductRemoved,
    StockEntry,
    Transfer,
    DayClosed,
    ClosureEdited,
    ClosureDeleted,
    StoreAdded,
    StoreRemoved,
    EmployeeAdded,
    EmployeeRemoved,
}

impl AuditAction {
    pub const ALL: [AuditAction; 15] = [
        AuditAction::SaleRecorded,
        AuditAction::SaleEdited,
        AuditAction::SaleDeleted,
        AuditAction::ProductAdded,
        AuditAction::ProductEdited,
        AuditAction::ProductRemoved,
        AuditAction::StockEntry,
        AuditAction::Transfer,
        AuditAction::DayClosed,
        AuditAction::ClosureEdited,
        AuditAction::ClosureDeleted,
        AuditAction::StoreAdded,
        AuditAction::StoreRemoved,
        AuditAction::EmployeeAdded,
        AuditAction::EmployeeRemoved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::SaleRecorded => "sale_recorded",
            AuditAction::SaleEdited => "sale_edited",
            AuditAction::SaleDeleted => "sale_deleted",
            AuditAction::ProductAdded => "product_added",
            AuditAction::ProductEdited => "product_edited",
            AuditAction::ProductRemoved => "product_removed",
            AuditAction::StockEntry => "stock_entry",
            AuditAction::Transfer => "transfer",
            AuditAction::DayClosed => "day_closed",
            AuditAction::ClosureEdited => "closure_edited",
            AuditAction::ClosureDeleted => "closure_deleted",
            AuditAction::StoreAdded => "store_added",
            AuditAction::StoreRemoved => "store_removed",
            AuditAction::EmployeeAdded => "employee_added",
            AuditAction::EmployeeRemoved => "employee_removed",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        AuditAction::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "action".to_string(),
                allowed: AuditAction::ALL.iter().map(|a| a.as_str().to_string()).collect(),
            })
    }
}

/// One audit log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuditEntry {
    pub id: String,
    pub action: AuditAction,
    /// What was acted on (sale id, product name, store name...).
    pub target: String,
    pub operator: String,
    pub store: String,
    pub details: String,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Stock Movements
// =============================================================================

/// Goods moved from one store to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Transfer {
    pub id: String,
    pub origin: String,
    pub destination: String,
    pub items: Vec<LineItem>,
    pub operator: String,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

/// Goods received by a store. `origin` is `None` for supplier deliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockEntry {
    pub id: String,
    pub destination: String,
    pub origin: Option<String>,
    pub items: Vec<LineItem>,
    pub operator: String,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Added,
    Edited,
    Removed,
}

/// Before/after snapshot of a product catalogue change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub kind: MovementKind,
    pub before: Option<Product>,
    pub after: Option<Product>,
    pub store: String,
    pub operator: String,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sale() -> Sale {
        Sale {
            id: RecordId::Remote("r1".to_string()),
            correlation_id: Some("c1".to_string()),
            store: "Socorro".to_string(),
            seller: "ryan".to_string(),
            items: vec![LineItem::new("Caderno", 2), LineItem::new("Caneta", 1), LineItem::new("Caderno", 1)],
            payments: vec![
                Payment::new(PaymentMethod::Cash, Money::from_cents(1000)),
                Payment::new(PaymentMethod::Pix, Money::from_cents(250)),
            ],
            note: None,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 0).unwrap(),
            below_minimum_alert: false,
            version: 1,
        }
    }

    #[test]
    fn test_payment_method_electronic() {
        assert!(!PaymentMethod::Cash.is_electronic());
        assert!(PaymentMethod::Pix.is_electronic());
        assert!(PaymentMethod::Credit.is_electronic());
        assert!(PaymentMethod::Debit.is_electronic());
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("dinheiro".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!("PIX".parse::<PaymentMethod>().unwrap(), PaymentMethod::Pix);
        assert_eq!("crédito".parse::<PaymentMethod>().unwrap(), PaymentMethod::Credit);
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_record_id_round_trip_through_display() {
        let local = RecordId::Local("abc".to_string());
        assert_eq!(local.to_string(), "local:abc");
        assert_eq!("local:abc".parse::<RecordId>().unwrap(), local);
        assert_eq!("xyz".parse::<RecordId>().unwrap(), RecordId::Remote("xyz".to_string()));
        assert!("  ".parse::<RecordId>().is_err());
    }

    #[test]
    fn test_record_id_serializes_tagged() {
        let json = serde_json::to_value(RecordId::Remote("xyz".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"space": "remote", "value": "xyz"}));
    }

    #[test]
    fn test_sale_helpers() {
        let s = sale();
        assert_eq!(s.paid().cents(), 1250);
        assert_eq!(s.note_or_empty(), "");
        assert_eq!(s.day(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        let q = s.quantity_by_product();
        assert_eq!(q.get("Caderno"), Some(&3));
        assert_eq!(q.get("Caneta"), Some(&1));
    }

    #[test]
    fn test_legacy_sale_deserializes_without_optional_fields() {
        let json = serde_json::json!({
            "id": {"space": "remote", "value": "old"},
            "store": "Socorro",
            "seller": "ryan",
            "items": [{"product_name": "Caderno", "quantity": 1}],
            "payments": [{"method": "cash", "amount_cents": 500}],
            "timestamp": "2023-12-31T10:00:00Z"
        });
        let s: Sale = serde_json::from_value(json).unwrap();
        assert!(s.correlation_id.is_none());
        assert!(!s.below_minimum_alert);
        assert_eq!(s.version, 0);
    }

    #[test]
    fn test_pending_entry_starts_pending() {
        let entry = PendingEntry::new("l1", sale());
        assert!(entry.pending);
        assert!(!entry.synced && !entry.deleted && !entry.edited);
        assert!(entry.remote_id.is_none());
    }

    #[test]
    fn test_audit_action_parsing() {
        assert_eq!("day_closed".parse::<AuditAction>().unwrap(), AuditAction::DayClosed);
        assert!("closed".parse::<AuditAction>().is_err());
        for action in AuditAction::ALL {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
    }
}
