//! Error types for memvec-db.

use thiserror::Error;

use crate::observer::NotificationError;

/// Result type alias for memvec-db operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in memvec-db operations.
#[derive(Debug, Error)]
pub enum DbError {
    // ========================================================================
    // Record store errors
    // ========================================================================
    /// A record with this id already exists.
    #[error("Record '{id}' already exists")]
    DuplicateId { id: String },

    /// No record with this id exists.
    #[error("Record '{id}' not found")]
    NotFound { id: String },

    /// Vector dimension mismatch.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The store reached its configured record limit.
    #[error("Store capacity reached: limit is {limit} records")]
    CapacityExceeded { limit: usize },

    // ========================================================================
    // Query errors
    // ========================================================================
    /// An argument was outside its accepted range.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    // ========================================================================
    // Observer errors
    // ========================================================================
    /// The mutation was applied but one or more observers failed.
    #[error(transparent)]
    Notification(#[from] NotificationError),

    // ========================================================================
    // General errors
    // ========================================================================
    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a duplicate id error.
    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId { id: id.into() }
    }

    /// Create a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the operation that produced this error still took effect.
    ///
    /// Only observer failures are reported after the mutation is applied.
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Notification(_))
    }
}
