//! Error types for relq.

use crate::record::Adr;
use thiserror::Error;

/// Result type alias for relq operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for query construction, optimization and execution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Table not found.
    #[error("nonexistent table: {name}")]
    TableNotFound { name: String },
    /// Column not found.
    #[error("{context}: nonexistent column: {column}")]
    ColumnNotFound { context: String, column: String },
    /// A column name would occur twice in a result.
    #[error("{context}: column already exists: {column}")]
    DuplicateColumn { context: String, column: String },
    /// Unique key violation on output.
    #[error("duplicate key: {key} in {table}")]
    DuplicateKey { table: String, key: String },
    /// Record not found at an address.
    #[error("record not found: {adr} in {table}")]
    RecordNotFound { table: String, adr: Adr },
    /// Every optimization path was infeasible.
    #[error("invalid query")]
    InvalidQuery,
    /// Write through a query that doesn't map to a single table.
    #[error("{context}: query not updateable")]
    NotUpdateable { context: String },
    /// Invalid expression.
    #[error("invalid expression: {message}")]
    InvalidExpression { message: String },
    /// Invalid operation (usage error).
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl Error {
    /// Creates a column not found error.
    pub fn column_not_found(context: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            context: context.into(),
            column: column.into(),
        }
    }

    /// Creates a duplicate column error.
    pub fn duplicate_column(context: impl Into<String>, column: impl Into<String>) -> Self {
        Error::DuplicateColumn {
            context: context.into(),
            column: column.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates a duplicate key error.
    pub fn duplicate_key(table: impl Into<String>, key: impl Into<String>) -> Self {
        Error::DuplicateKey {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Creates a not updateable error.
    pub fn not_updateable(context: impl Into<String>) -> Self {
        Error::NotUpdateable {
            context: context.into(),
        }
    }

    /// Creates an invalid expression error.
    pub fn invalid_expression(message: impl Into<String>) -> Self {
        Error::InvalidExpression {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::column_not_found("project", "name");
        assert_eq!(err.to_string(), "project: nonexistent column: name");

        let err = Error::table_not_found("users");
        assert!(err.to_string().contains("users"));

        assert_eq!(Error::InvalidQuery.to_string(), "invalid query");
    }

    #[test]
    fn test_error_constructors() {
        let err = Error::duplicate_key("users", "(1)");
        match err {
            Error::DuplicateKey { table, .. } => assert_eq!(table, "users"),
            _ => panic!("Wrong error type"),
        }
    }
}
