use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Caller-supplied record failed a precondition. Nothing was written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A uniqueness or foreign-key rule rejected the write.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Statement could not be built or prepared (unknown table/column, bad arity).
    #[error("query error: {0}")]
    Query(String),

    /// Transport, locking or any other driver failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// A row could not be converted into the requested record type.
    #[error("cannot convert {table} row into {target}: {reason}")]
    Conversion {
        table: String,
        target: &'static str,
        reason: String,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, msg) if err.code == ErrorCode::ConstraintViolation => {
                Self::ConstraintViolation(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            // SQLITE_ERROR: "no such table", "no such column", syntax errors
            rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::Unknown => {
                Self::Query(e.to_string())
            }
            rusqlite::Error::InvalidColumnName(_)
            | rusqlite::Error::InvalidColumnIndex(_)
            | rusqlite::Error::InvalidParameterCount(_, _)
            | rusqlite::Error::InvalidParameterName(_) => Self::Query(e.to_string()),
            _ => Self::Connection(e.to_string()),
        }
    }
}
