//! Error types for qorm

use thiserror::Error;

/// Boxed error coming from an executor or driver.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for qorm operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for building, compiling and executing queries.
///
/// Building a query never fails. Every variant below is raised either while
/// compiling a [`QuerySpec`](crate::qb::QuerySpec) or while executing it.
#[derive(Debug, Error)]
pub enum OrmError {
    /// A where-family call received an argument shape it cannot compile.
    #[error("Malformed predicate on '{column}': {reason}")]
    MalformedPredicate { column: String, reason: String },

    /// Multi-row insert where rows disagree on their column set.
    #[error("Inconsistent columns in row {row}: expected [{expected}], got [{got}]")]
    InconsistentColumns {
        row: usize,
        expected: String,
        got: String,
    },

    /// Zero rows where exactly one was required.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The executor failed to run a statement.
    #[error("Execution failed: {0}")]
    ExecutionFailed(#[source] BoxError),

    /// A transaction body failed and the transaction was rolled back.
    #[error("Transaction rolled back: {cause}{}", rollback_suffix(.rollback_error))]
    TransactionFailed {
        #[source]
        cause: Box<OrmError>,
        rollback_error: Option<String>,
    },

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Validation error (invalid builder state detected at compile time)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error (unknown dialect, unparsable config file)
    #[error("Config error: {0}")]
    Config(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

fn rollback_suffix(rollback_error: &Option<String>) -> String {
    match rollback_error {
        Some(e) => format!(" (rollback failed: {e})"),
        None => String::new(),
    }
}

impl OrmError {
    /// Create a malformed predicate error for a specific column
    pub fn malformed(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPredicate {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wrap an executor failure.
    pub fn execution(err: impl Into<BoxError>) -> Self {
        Self::ExecutionFailed(err.into())
    }

    /// Wrap the failure of a transaction body.
    pub fn transaction(cause: OrmError, rollback_error: Option<String>) -> Self {
        Self::TransactionFailed {
            cause: Box::new(cause),
            rollback_error,
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), Self::NotFound(_))
    }

    /// Check if this is a malformed predicate error
    pub fn is_malformed(&self) -> bool {
        matches!(self.root_cause(), Self::MalformedPredicate { .. })
    }

    /// Unwrap nested transaction failures down to the error that caused the rollback.
    pub fn root_cause(&self) -> &OrmError {
        let mut current = self;
        while let Self::TransactionFailed { cause, .. } = current {
            current = cause;
        }
        current
    }
}
