//! Error taxonomy shared by the stores and the lending engine.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Every failure an engine operation can report to its caller.
#[derive(Error, Debug)]
pub enum LendingError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// A precondition about the current domain state does not hold.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A concurrent writer changed the row between our read and our write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The requested mutation would break the copy-count invariant.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),
}

impl From<rusqlite::Error> for LendingError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                LendingError::Conflict(format!("database is locked by another writer ({err})"))
            }
            _ => LendingError::Database(err),
        }
    }
}

/// Result type alias for lending operations
pub type LendingResult<T> = Result<T, LendingError>;
