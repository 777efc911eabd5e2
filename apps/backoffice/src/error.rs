//! # Service Error Type
//!
//! What callers of the back-office services see.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Source                          ServiceError          kind()          │
//! │  ──────                          ────────────          ──────          │
//! │  DbError::NotFound          ──►  NotFound              NOT_FOUND       │
//! │  ValidationError            ──►  Validation            VALIDATION_ERROR│
//! │  DbError::InvalidState      ──►  Conflict              CONFLICT        │
//! │  DbError::UniqueViolation   ──►  Conflict              CONFLICT        │
//! │  CoreError::Forbidden       ──►  Unauthorized          UNAUTHORIZED    │
//! │  CoreError::OwnerUnresolved ──►  Unauthorized          UNAUTHORIZED    │
//! │  deadline elapsed           ──►  DeadlineExceeded      DEADLINE_EXCEEDED│
//! │  any other DbError          ──►  Storage               STORAGE_ERROR   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage detail is logged where it is converted and replaced by a generic
//! message in [`ServiceError::user_message`].

use serde::Serialize;
use tally_core::{CoreError, ValidationError};
use tally_db::DbError;

/// Back-office service errors.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not allowed: {0}")]
    Unauthorized(String),

    #[error("{operation} did not finish within {after_ms}ms")]
    DeadlineExceeded { operation: &'static str, after_ms: u64 },

    #[error("Storage failure: {0}")]
    Storage(String),
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    ValidationError,
    Conflict,
    Unauthorized,
    DeadlineExceeded,
    StorageError,
}

/// Error payload handed to the transport layer.
///
/// ```json
/// { "code": "CONFLICT", "message": "Conflict: Sale ORD-17 is already refunded" }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: ErrorKind,
    pub message: String,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Validation(_) => ErrorKind::ValidationError,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::Unauthorized(_) => ErrorKind::Unauthorized,
            ServiceError::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            ServiceError::Storage(_) => ErrorKind::StorageError,
        }
    }

    /// Message safe to show an end user.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Storage(_) => "Database operation failed".to_string(),
            ServiceError::DeadlineExceeded { .. } => {
                "The operation took too long and was rolled back".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.kind(),
            message: self.user_message(),
        }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        ServiceError::NotFound(format!("{} not found: {}", entity, id))
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { .. } => ServiceError::NotFound(err.to_string()),
            DbError::InvalidState { .. } | DbError::UniqueViolation { .. } => {
                ServiceError::Conflict(err.to_string())
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ServiceError::Validation("Invalid reference".to_string())
            }
            other => {
                tracing::error!(error = %other, "Storage failure");
                ServiceError::Storage(other.to_string())
            }
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidSaleStatus { .. } => ServiceError::Conflict(err.to_string()),
            CoreError::OwnerUnresolved(_) | CoreError::Forbidden { .. } => {
                ServiceError::Unauthorized(err.to_string())
            }
            CoreError::Validation(e) => ServiceError::Validation(e.to_string()),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}
