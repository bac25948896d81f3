//! # Error Types
//!
//! Domain-specific error types for banz-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  banz-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  banz-db errors                                                        │
//! │  └── DbError          - Local SQLite failures                          │
//! │                                                                         │
//! │  banz-sync errors                                                      │
//! │  └── SyncError        - Workflow / remote store failures               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → ApiError → Operator   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product is not stocked by the store.
    ///
    /// ## When This Occurs
    /// - Line item names a product the store never had
    /// - Product was removed after the sale was drafted
    #[error("Product '{name}' not found in store {store}")]
    ProductNotFound { store: String, name: String },

    /// Not enough stock to move goods out of a store.
    ///
    /// Sales never raise this: a shortfall on a sale is an operator prompt,
    /// and stock may legally go negative. Transfers refuse instead.
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// Transfer whose destination is the origin store.
    #[error("Cannot transfer from {store} to itself")]
    SameStoreTransfer { store: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any side effect; the submission is simply aborted.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., malformed date or item argument).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., a second store with the same name).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Line item references a product the store does not stock.
    #[error("Product not found: {name}")]
    UnknownProduct { name: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product: "Caderno".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Caderno: available 3, requested 5"
        );

        let err = ValidationError::UnknownProduct {
            name: "Lápis".to_string(),
        };
        assert_eq!(err.to_string(), "Product not found: Lápis");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "items".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
