//! # Validation Module
//!
//! Input validation for sales, products, stock movements and names.
//!
//! ## Sale Validation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Sale Submission Checks                             │
//! │                                                                         │
//! │  1. validate_sale_draft      items present, quantities > 0             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  2. check_line_items         unknown product  → ValidationError        │
//! │           │                  short on stock   → StockShortfall (data)  │
//! │           ▼                                                             │
//! │     (operator confirms each shortfall; negative stock is legal)        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  3. validate_payments        every payment amount > 0                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  4. minimum price check      see totals::is_below_minimum              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every check here is pure; nothing is written until all of them pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::types::{LineItem, Payment, Product, ProductDraft, SaleDraft};
use crate::{MAX_AMOUNT_CENTS, MAX_ITEM_QUANTITY, MAX_NAME_LENGTH, MAX_NOTE_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a store, employee or product name.
///
/// ## Rules
/// - Must not be blank
/// - At most [`MAX_NAME_LENGTH`] characters
///
/// ## Example
/// ```rust
/// use banz_core::validation::validate_name;
///
/// assert!(validate_name("store", "Banca Socorro").is_ok());
/// assert!(validate_name("store", "   ").is_err());
/// ```
pub fn validate_name(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LENGTH,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line item quantity.
///
/// ## Example
/// ```rust
/// use banz_core::validation::validate_quantity;
///
/// assert!(validate_quantity(2).is_ok());
/// assert!(validate_quantity(0).is_err());
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a min/max price pair (centavos).
pub fn validate_price_range(min_cents: i64, max_cents: i64) -> ValidationResult<()> {
    if min_cents < 0 {
        return Err(ValidationError::MustBePositive {
            field: "min price".to_string(),
        });
    }

    if max_cents < min_cents {
        return Err(ValidationError::InvalidFormat {
            field: "max price".to_string(),
            reason: "must not be below min price".to_string(),
        });
    }

    if max_cents > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "max price".to_string(),
            min: min_cents,
            max: MAX_AMOUNT_CENTS,
        });
    }

    Ok(())
}

/// Every payment must carry a positive amount of at most
/// [`MAX_AMOUNT_CENTS`].
pub fn validate_payments(payments: &[Payment]) -> ValidationResult<()> {
    if payments.is_empty() {
        return Err(ValidationError::Required {
            field: "payments".to_string(),
        });
    }

    if payments.iter().any(|p| !p.amount().is_positive()) {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    if payments.iter().any(|p| p.amount_cents > MAX_AMOUNT_CENTS) {
        return Err(ValidationError::OutOfRange {
            field: "payment amount".to_string(),
            min: 1,
            max: MAX_AMOUNT_CENTS,
        });
    }

    Ok(())
}

// =============================================================================
// Composite Validators
// =============================================================================

/// Validates a list of line items (sale, stock entry or transfer).
pub fn validate_items(items: &[LineItem]) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    for item in items {
        validate_name("product", &item.product_name)?;
        validate_quantity(item.quantity)?;
    }

    Ok(())
}

/// Structural checks on a sale draft. Payments are checked separately,
/// after stock shortfalls have been confirmed.
pub fn validate_sale_draft(draft: &SaleDraft) -> ValidationResult<()> {
    validate_items(&draft.items)?;

    if let Some(note) = &draft.note {
        if note.chars().count() > MAX_NOTE_LENGTH {
            return Err(ValidationError::TooLong {
                field: "note".to_string(),
                max: MAX_NOTE_LENGTH,
            });
        }
    }

    Ok(())
}

/// Validates a product before it is created or edited.
pub fn validate_product_draft(draft: &ProductDraft) -> ValidationResult<()> {
    validate_name("product", &draft.name)?;

    if draft.quantity < 0 {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    validate_price_range(draft.min_price_cents, draft.max_price_cents)
}

// =============================================================================
// Stock Checks
// =============================================================================

/// A line item that asks for more than the cached stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortfall {
    pub product: String,
    pub available: i64,
    pub requested: i64,
}

/// Resolves every line item against the store's products.
///
/// Quantities for the same product are summed across lines before comparing
/// with stock.
///
/// ## Returns
/// * `Err(UnknownProduct)` - a line names a product the store lacks
/// * `Ok(shortfalls)` - possibly empty; each needs operator confirmation
pub fn check_line_items(
    items: &[LineItem],
    products: &[Product],
) -> ValidationResult<Vec<StockShortfall>> {
    let mut requested: BTreeMap<&str, i64> = BTreeMap::new();
    for item in items {
        if !products.iter().any(|p| p.name == item.product_name) {
            return Err(ValidationError::UnknownProduct {
                name: item.product_name.clone(),
            });
        }
        *requested.entry(item.product_name.as_str()).or_insert(0) += item.quantity;
    }

    let shortfalls = requested
        .into_iter()
        .filter_map(|(name, qty)| {
            let product = products.iter().find(|p| p.name == name)?;
            (product.quantity < qty).then(|| StockShortfall {
                product: name.to_string(),
                available: product.quantity,
                requested: qty,
            })
        })
        .collect();

    Ok(shortfalls)
}

// =============================================================================
// Unit Tests
// =============================================================================
