//! Error types for st-db

use thiserror::Error;

/// Stable classification of driver failures.
///
/// Driver messages vary between releases; the code gives callers a fixed
/// vocabulary to match on and a human-readable description to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A table, view, index or schema with that name already exists
    RelationExists,
    /// The referenced relation does not exist
    RelationNotFound,
    /// The enclosing transaction failed earlier and must be rolled back
    TransactionAborted,
    /// A concurrent transaction committed a write to the same rows first
    TransactionConflict,
    /// A constraint (primary key, unique, check, not null) was violated
    ConstraintViolation,
    /// The statement could not be parsed
    SyntaxError,
}

/// Fixed code → message table used by [`DbError::describe`].
const CODE_MESSAGES: &[(ErrorCode, &str)] = &[
    (ErrorCode::RelationExists, "Relation already exists"),
    (ErrorCode::RelationNotFound, "Relation does not exist"),
    (ErrorCode::TransactionAborted, "Transaction aborted"),
    (ErrorCode::TransactionConflict, "Concurrent write conflict"),
    (ErrorCode::ConstraintViolation, "Constraint violation"),
    (ErrorCode::SyntaxError, "SQL syntax error"),
];

impl ErrorCode {
    /// Human-readable message for this code
    pub fn message(self) -> &'static str {
        CODE_MESSAGES
            .iter()
            .find(|(code, _)| *code == self)
            .map(|(_, msg)| *msg)
            .unwrap_or("Database error")
    }

    /// Classify a raw DuckDB error message.
    ///
    /// duckdb::Error does not expose structured variants, so we match on the
    /// error category prefix and a few narrow phrases.
    pub fn classify(message: &str) -> Option<Self> {
        let lower = message.to_ascii_lowercase();
        if lower.contains("current transaction is aborted") {
            Some(ErrorCode::TransactionAborted)
        } else if lower.contains("transactioncontext error") && lower.contains("conflict") {
            Some(ErrorCode::TransactionConflict)
        } else if lower.contains("catalog error") && lower.contains("already exists") {
            Some(ErrorCode::RelationExists)
        } else if lower.contains("catalog error")
            && (lower.contains("does not exist") || lower.contains("not found"))
        {
            Some(ErrorCode::RelationNotFound)
        } else if lower.contains("constraint error") {
            Some(ErrorCode::ConstraintViolation)
        } else if lower.contains("parser error") {
            Some(ErrorCode::SyntaxError)
        } else {
            None
        }
    }
}

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Statement execution error (D002)
    #[error("[D002] SQL execution failed: {message}")]
    ExecutionError {
        code: Option<ErrorCode>,
        message: String,
    },

    /// Transaction control error (D003)
    #[error("[D003] Transaction {operation} failed: {message}")]
    TransactionError {
        operation: &'static str,
        message: String,
    },

    /// Column value could not be converted (D004)
    #[error("[D004] Column {index}: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: &'static str,
        found: String,
    },

    /// Column index out of range (D005)
    #[error("[D005] Column {index} out of range (row has {len} columns)")]
    ColumnOutOfRange { index: usize, len: usize },

    /// Mutex poisoned (D006)
    #[error("[D006] Database mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// Internal error (D007)
    #[error("[D007] Internal database error: {0}")]
    Internal(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Build an execution error from a raw driver message, classifying it.
    pub fn execution(message: impl Into<String>) -> Self {
        let message = message.into();
        DbError::ExecutionError {
            code: ErrorCode::classify(&message),
            message,
        }
    }

    /// Classification code, when the failure maps to a known provider error
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            DbError::ExecutionError { code, .. } => *code,
            DbError::TransactionError { message, .. } => ErrorCode::classify(message),
            _ => None,
        }
    }

    /// Stable, human-readable description of the failure.
    ///
    /// Known provider errors are translated through the code table; anything
    /// else falls back to the raw message.
    pub fn describe(&self) -> String {
        if let Some(code) = self.code() {
            return code.message().to_string();
        }
        match self {
            DbError::ExecutionError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        DbError::execution(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_relation_exists() {
        let msg = "Catalog Error: Table with name foo already exists!";
        assert_eq!(ErrorCode::classify(msg), Some(ErrorCode::RelationExists));
    }

    #[test]
    fn test_classify_relation_not_found() {
        let msg = "Catalog Error: Table with name missing does not exist!\nDid you mean \"foo\"?";
        assert_eq!(ErrorCode::classify(msg), Some(ErrorCode::RelationNotFound));
    }

    #[test]
    fn test_classify_transaction_aborted() {
        let msg = "TransactionContext Error: Current transaction is aborted (please ROLLBACK)";
        assert_eq!(ErrorCode::classify(msg), Some(ErrorCode::TransactionAborted));
    }

    #[test]
    fn test_classify_write_conflict() {
        let msg = "TransactionContext Error: Conflict on update!";
        assert_eq!(ErrorCode::classify(msg), Some(ErrorCode::TransactionConflict));
        let err = DbError::execution(msg);
        assert_eq!(err.code(), Some(ErrorCode::TransactionConflict));
        assert_eq!(err.describe(), "Concurrent write conflict");
    }

    #[test]
    fn test_classify_constraint_and_syntax() {
        assert_eq!(
            ErrorCode::classify("Constraint Error: Duplicate key \"id: 1\""),
            Some(ErrorCode::ConstraintViolation)
        );
        assert_eq!(
            ErrorCode::classify("Parser Error: syntax error at or near \"CREAT\""),
            Some(ErrorCode::SyntaxError)
        );
    }

    #[test]
    fn test_describe_uses_code_table() {
        let err = DbError::execution("Catalog Error: Table with name foo already exists!");
        assert_eq!(err.describe(), "Relation already exists");
    }

    #[test]
    fn test_describe_falls_back_to_raw_message() {
        let err = DbError::execution("Binder Error: something unusual");
        assert_eq!(err.code(), None);
        assert_eq!(err.describe(), "Binder Error: something unusual");
    }

    #[test]
    fn test_every_code_has_a_message() {
        for code in [
            ErrorCode::RelationExists,
            ErrorCode::RelationNotFound,
            ErrorCode::TransactionAborted,
            ErrorCode::TransactionConflict,
            ErrorCode::ConstraintViolation,
            ErrorCode::SyntaxError,
        ] {
            assert_ne!(code.message(), "Database error");
        }
    }
}
