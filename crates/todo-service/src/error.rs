//! Service error taxonomy.

use std::fmt;

use thiserror::Error;
use todo_state::{StoreError, TodoId};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Database operation kinds, used as the `operation` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOperation {
    Insert,
    Select,
    Update,
    Delete,
    Count,
}

impl DbOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbOperation::Insert => "insert",
            DbOperation::Select => "select",
            DbOperation::Update => "update",
            DbOperation::Delete => "delete",
            DbOperation::Count => "count",
        }
    }
}

impl fmt::Display for DbOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every way a service call can fail.
///
/// Only `Persistence` is counted as a database error; the other two are
/// expected outcomes of bad or stale client input.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Todo with ID {0} not found")]
    NotFound(TodoId),

    #[error("{0}")]
    Validation(String),

    #[error("{operation} on todos failed: {source}")]
    Persistence {
        operation: DbOperation,
        #[source]
        source: StoreError,
    },
}

impl ServiceError {
    /// Category label used by HTTP error metrics.
    pub fn category(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Validation(_) => "validation",
            ServiceError::Persistence { .. } => "persistence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_and_categories() {
        let err = ServiceError::NotFound(7);
        assert_eq!(err.to_string(), "Todo with ID 7 not found");
        assert_eq!(err.category(), "not_found");

        let err = ServiceError::Persistence {
            operation: DbOperation::Insert,
            source: StoreError::Connection("reset by peer".into()),
        };
        assert_eq!(
            err.to_string(),
            "insert on todos failed: connection error: reset by peer"
        );
        assert_eq!(err.category(), "persistence");
    }
}
