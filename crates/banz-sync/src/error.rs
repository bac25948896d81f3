//! # Workflow Error Types
//!
//! Error types for every workflow that touches the remote store or the
//! local database.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Workflow Error Categories                         │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Operator       │  │   Remote        │  │     Configuration       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  WriteFailure   │  │  InvalidConfig          │ │
//! │  │  Core           │  │  Unavailable    │  │  ConfigLoadFailed       │ │
//! │  │  Cancelled      │  │  Conflict       │  │  ConfigSaveFailed       │ │
//! │  │  NotFound       │  │                 │  │                         │ │
//! │  │  Duplicate      │  │                 │  │                         │ │
//! │  │  AuthFailed     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Local        │  │     Export      │                              │
//! │  │                 │  │                 │                              │
//! │  │  DatabaseError  │  │  ExportFailed   │                              │
//! │  │  Serialization  │  │                 │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these is fatal to the process. The CLI prints them and exits
//! non-zero; audit log failures never get this far (they are logged and
//! swallowed).

use thiserror::Error;

use banz_core::{CoreError, ValidationError};
use banz_db::DbError;

/// Result type alias for workflow operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Workflow error type.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Operator Errors
    // =========================================================================
    /// Invalid input. Nothing was written.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Business rule violation (insufficient stock on a transfer, ...).
    #[error("{0}")]
    Core(CoreError),

    /// The operator declined a confirmation prompt.
    #[error("Cancelled by operator: {0}")]
    Cancelled(String),

    /// Record doesn't exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A record with the same key already exists.
    #[error("{entity} '{value}' already exists")]
    Duplicate { entity: String, value: String },

    /// Wrong employee or admin password.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    // =========================================================================
    // Remote Store Errors
    // =========================================================================
    /// A write to the remote store failed. The operation was not queued.
    #[error("Remote write failed: {0}")]
    RemoteWriteFailure(String),

    /// The remote store can't be reached.
    #[error("Remote store unavailable")]
    RemoteUnavailable,

    /// Compare-and-set lost against a concurrent writer.
    #[error("Conflict detected for {entity}/{id}: expected version {expected}, found {actual}")]
    ConflictDetected {
        entity: String,
        id: String,
        expected: i64,
        actual: i64,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Local database query failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A record could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Backup file could not be written.
    #[error("Export failed: {0}")]
    ExportFailed(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        SyncError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Duplicate error.
    pub fn duplicate(entity: impl Into<String>, value: impl Into<String>) -> Self {
        SyncError::Duplicate {
            entity: entity.into(),
            value: value.into(),
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => SyncError::Validation(v),
            other => SyncError::Core(other),
        }
    }
}

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => SyncError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => SyncError::Duplicate {
                entity: field,
                value,
            },
            DbError::VersionConflict {
                entity,
                id,
                expected,
                actual,
            } => SyncError::ConflictDetected {
                entity,
                id,
                expected,
                actual,
            },
            DbError::Serialization(msg) => SyncError::SerializationFailed(msg),
            other => SyncError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the operation may succeed when tried again.
    ///
    /// ## Retryable Errors
    /// - Remote store unreachable or a write failed in transit
    /// - Lost compare-and-set race (re-read and try again)
    ///
    /// ## Non-Retryable Errors
    /// - Validation, cancellations, authentication
    /// - Configuration errors
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteUnavailable
                | SyncError::RemoteWriteFailure(_)
                | SyncError::ConflictDetected { .. }
        )
    }

    /// Returns true if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if the operator caused it and can fix it.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SyncError::Validation(_)
                | SyncError::Core(_)
                | SyncError::Cancelled(_)
                | SyncError::NotFound { .. }
                | SyncError::Duplicate { .. }
                | SyncError::AuthenticationFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_maps_to_conflict() {
        let err: SyncError = DbError::VersionConflict {
            entity: "produtos".to_string(),
            id: "p1".to_string(),
            expected: 2,
            actual: 3,
        }
        .into();
        assert!(matches!(err, SyncError::ConflictDetected { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_core_validation_is_flattened() {
        let err: SyncError = CoreError::Validation(ValidationError::Required {
            field: "items".to_string(),
        })
        .into();
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_categories() {
        assert!(SyncError::RemoteUnavailable.is_retryable());
        assert!(!SyncError::RemoteUnavailable.is_user_error());
        assert!(SyncError::InvalidConfig("x".into()).is_config_error());
        assert!(SyncError::Cancelled("stock".into()).is_user_error());
        assert!(!SyncError::Cancelled("stock".into()).is_retryable());
    }
}
