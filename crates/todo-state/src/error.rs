//! Error types for the todo persistence layer.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to a todo store.
///
/// "Row not found" is deliberately absent: lookups return `Option` and the
/// service layer decides what a missing row means.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("query error: {0}")]
    Query(String),
}

impl StoreError {
    /// Stable classification used as the `error_type` metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Open(_) => "open",
            StoreError::Transaction(_) => "transaction",
            StoreError::Table(_) => "table",
            StoreError::Read(_) => "read",
            StoreError::Write(_) => "write",
            StoreError::Serialize(_) => "serialize",
            StoreError::Deserialize(_) => "deserialize",
            StoreError::Connection(_) => "connection",
            StoreError::Constraint(_) => "constraint",
            StoreError::Query(_) => "query",
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation()
                {
                    StoreError::Constraint(db.message().to_string())
                } else {
                    StoreError::Query(db.message().to_string())
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Connection(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Deserialize(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_snake_case_labels() {
        assert_eq!(StoreError::Open("x".into()).kind(), "open");
        assert_eq!(StoreError::Constraint("x".into()).kind(), "constraint");
        assert_eq!(StoreError::Deserialize("x".into()).kind(), "deserialize");
    }

    #[test]
    fn sqlx_pool_errors_are_connection_failures() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.kind(), "connection");

        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), "query");
    }
}
