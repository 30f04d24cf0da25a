//! Adapter layer for memvec-db infrastructure.
//!
//! Maps `DbError` variants onto the façade's `VecDbError` taxonomy so that
//! callers only ever see one error type.

use memvec_db::{DbError, DbResult};

use crate::errors::VecDbError;

/// Convert a memvec-db error to a memvec-core error.
pub fn from_db_error(err: DbError) -> VecDbError {
    match err {
        DbError::DuplicateId { id } => VecDbError::DuplicateId(id),
        DbError::NotFound { id } => VecDbError::NotFound(id),
        DbError::DimensionMismatch { expected, actual } => {
            VecDbError::DimensionMismatch { expected, actual }
        }
        DbError::CapacityExceeded { limit } => VecDbError::CapacityExceeded { limit },
        DbError::InvalidArgument { message } => VecDbError::InvalidArgument(message),
        DbError::Notification(inner) => VecDbError::ObserverNotification(inner),
        DbError::Internal { message } => VecDbError::Internal(message),
    }
}

impl From<DbError> for VecDbError {
    fn from(err: DbError) -> Self {
        from_db_error(err)
    }
}

/// Extension trait to convert DbResult to Result<T, VecDbError>.
pub trait IntoVecDbResult<T> {
    /// Convert a DbResult to a VecDbError result.
    fn into_vecdb_result(self) -> Result<T, VecDbError>;
}

impl<T> IntoVecDbResult<T> for DbResult<T> {
    fn into_vecdb_result(self) -> Result<T, VecDbError> {
        self.map_err(from_db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memvec_db::{EventKind, NotificationError};

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            from_db_error(DbError::duplicate_id("a")),
            VecDbError::DuplicateId(id) if id == "a"
        ));
        assert!(matches!(
            from_db_error(DbError::not_found("b")),
            VecDbError::NotFound(id) if id == "b"
        ));
        assert!(matches!(
            from_db_error(DbError::DimensionMismatch {
                expected: 2,
                actual: 3
            }),
            VecDbError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert!(matches!(
            from_db_error(DbError::invalid_argument("top_k")),
            VecDbError::InvalidArgument(_)
        ));
        assert!(matches!(
            from_db_error(DbError::internal("poisoned")),
            VecDbError::Internal(_)
        ));
    }

    #[test]
    fn test_notification_stays_committed() {
        let db_err = DbError::from(NotificationError {
            kind: EventKind::Insert,
            failures: Vec::new(),
        });
        assert!(db_err.is_committed());

        let result: DbResult<()> = Err(db_err);
        assert!(result.into_vecdb_result().unwrap_err().is_committed());
    }
}
