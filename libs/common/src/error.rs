//! Custom error types for the common library
//!
//! This module defines storage error types shared by every crate that talks
//! to PostgreSQL.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// SQLSTATE raised by PostgreSQL when an exclusion constraint is violated
pub const EXCLUSION_VIOLATION: &str = "23P01";

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

impl DatabaseError {
    /// Name of the violated constraint when the query failed on a unique or
    /// exclusion constraint, `None` otherwise
    pub fn violated_constraint(&self) -> Option<&str> {
        match self {
            DatabaseError::Query(SqlxError::Database(db_err))
                if db_err.is_unique_violation()
                    || db_err.code().as_deref() == Some(EXCLUSION_VIOLATION) =>
            {
                db_err.constraint()
            }
            _ => None,
        }
    }
}

impl From<SqlxError> for DatabaseError {
    fn from(err: SqlxError) -> Self {
        DatabaseError::Query(err)
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_have_no_constraint() {
        let err = DatabaseError::Query(SqlxError::RowNotFound);
        assert_eq!(err.violated_constraint(), None);

        let err = DatabaseError::Configuration("bad url".to_string());
        assert_eq!(err.violated_constraint(), None);
    }

    #[test]
    fn test_error_messages() {
        let err = DatabaseError::Migration("checksum mismatch".to_string());
        assert_eq!(err.to_string(), "Database migration error: checksum mismatch");
    }
}
