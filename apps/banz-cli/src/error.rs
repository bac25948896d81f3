//! # CLI Error Type
//!
//! Unified error type for every command.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the banz binary                        │
//! │                                                                         │
//! │  banz sell --item Caderno=2 --pay cash=10,00                            │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Command Function                                                │  │
//! │  │  Result<(), ApiError>                                            │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Bad argument?  ── ValidationError ─────────────┐               │  │
//! │  │         │                                        │               │  │
//! │  │         ▼                                        ▼               │  │
//! │  │  Workflow failed? ── SyncError ────────────── ApiError ─────────►│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  stderr:  [REMOTE_UNAVAILABLE] Remote store unavailable                 │
//! │  exit:    1                                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! With `--json` the error is printed as `{"code": ..., "message": ...}`.

use serde::Serialize;

use banz_core::ValidationError;
use banz_sync::SyncError;

/// Error printed when a command fails.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for scripts
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Record doesn't exist
    NotFound,

    /// Input validation failed
    ValidationError,

    /// Business rule refused the operation
    BusinessLogic,

    /// Operator declined a confirmation
    Cancelled,

    /// Record with the same name exists
    Duplicate,

    /// Wrong password or no session
    Unauthorized,

    /// Remote store can't be reached
    RemoteUnavailable,

    /// Remote store rejected a write
    RemoteWriteFailure,

    /// Concurrent writer won a compare-and-set
    Conflict,

    /// Configuration is invalid or unreadable
    ConfigError,

    /// Local database failed
    DatabaseError,

    /// Backup could not be written
    ExportError,

    /// Anything else
    Internal,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

/// Converts workflow errors to API errors.
impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let code = match &err {
            SyncError::Validation(_) => ErrorCode::ValidationError,
            SyncError::Core(_) => ErrorCode::BusinessLogic,
            SyncError::Cancelled(_) => ErrorCode::Cancelled,
            SyncError::NotFound { .. } => ErrorCode::NotFound,
            SyncError::Duplicate { .. } => ErrorCode::Duplicate,
            SyncError::AuthenticationFailed(_) => ErrorCode::Unauthorized,
            SyncError::RemoteWriteFailure(_) => ErrorCode::RemoteWriteFailure,
            SyncError::RemoteUnavailable => ErrorCode::RemoteUnavailable,
            SyncError::ConflictDetected { .. } => ErrorCode::Conflict,
            SyncError::InvalidConfig(_)
            | SyncError::ConfigLoadFailed(_)
            | SyncError::ConfigSaveFailed(_) => ErrorCode::ConfigError,
            SyncError::DatabaseError(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database error: {}", e);
                return ApiError::new(ErrorCode::DatabaseError, "Local database operation failed");
            }
            SyncError::SerializationFailed(_) | SyncError::Internal(_) => ErrorCode::Internal,
            SyncError::ExportFailed(_) => ErrorCode::ExportError,
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_value(self.code) {
            Ok(serde_json::Value::String(code)) => write!(f, "[{}] {}", code, self.message),
            _ => write!(f, "[{:?}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_errors_map_to_codes() {
        let err: ApiError = SyncError::RemoteUnavailable.into();
        assert_eq!(err.code, ErrorCode::RemoteUnavailable);
        assert_eq!(err.to_string(), "[REMOTE_UNAVAILABLE] Remote store unavailable");

        let err: ApiError = SyncError::not_found("closure", "c1").into();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "closure not found: c1");

        let err: ApiError = SyncError::DatabaseError("disk I/O error".into()).into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.message.contains("disk"));
    }

    #[test]
    fn test_json_shape() {
        let err = ApiError::new(ErrorCode::Cancelled, "Cancelled by operator: stock");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "CANCELLED");
        assert_eq!(json["message"], "Cancelled by operator: stock");
    }
}
