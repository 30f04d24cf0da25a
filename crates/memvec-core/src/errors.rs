//! Error types for memvec-core.

use std::path::PathBuf;

use memvec_db::NotificationError;
use thiserror::Error;

/// Result type alias for database operations.
pub type VecDbResult<T> = Result<T, VecDbError>;

/// Errors surfaced by the [`Database`](crate::Database) façade.
#[derive(Error, Debug)]
pub enum VecDbError {
    /// `add` was called with an id that is already stored.
    #[error("Record `{0}` already exists.")]
    DuplicateId(String),

    /// No record with this id exists.
    #[error("Record `{0}` not found.")]
    NotFound(String),

    /// A vector's length does not match the store dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}.")]
    DimensionMismatch {
        /// The store (or query) dimension.
        expected: usize,
        /// The length that was supplied.
        actual: usize,
    },

    /// Invalid argument provided to an operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The configured record limit was reached.
    #[error("Database is full: limit is {limit} records.")]
    CapacityExceeded {
        /// The configured `maxRecords`.
        limit: usize,
    },

    /// The mutation was applied, but one or more observers failed.
    ///
    /// This is a diagnostic, not a failure of the operation itself: the
    /// store already reflects the mutation.
    #[error("Mutation applied, but observers failed: {0}")]
    ObserverNotification(#[source] NotificationError),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {message}. {hint}")]
    InvalidConfiguration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    /// A configuration file could not be read or parsed.
    #[error("Config file error at `{path}`: {message}")]
    ConfigFile {
        /// Path to the config file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Unexpected internal failure (e.g. a poisoned lock).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VecDbError {
    /// Whether the operation that returned this error still took effect.
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::ObserverNotification(_))
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
            hint: hint.into(),
        }
    }
}
