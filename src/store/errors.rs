//! Document store errors
//!
//! Stores report failures with numeric codes. The engine classifies errors
//! by code, so the codes below match the ones document databases use.

use thiserror::Error;

/// Label attached to errors after which the whole transaction may be retried.
pub const TRANSIENT_TRANSACTION_ERROR: &str = "TransientTransactionError";

/// Numeric store error codes
pub mod codes {
    pub const INTERNAL_ERROR: i32 = 1;
    pub const BAD_VALUE: i32 = 2;
    pub const FAILED_TO_PARSE: i32 = 9;
    pub const NAMESPACE_NOT_FOUND: i32 = 26;
    pub const NAMESPACE_EXISTS: i32 = 48;
    pub const IMMUTABLE_FIELD: i32 = 66;
    pub const WRITE_CONFLICT: i32 = 112;
    pub const DOCUMENT_VALIDATION_FAILURE: i32 = 121;
    pub const NO_SUCH_SESSION: i32 = 206;
    pub const NO_SUCH_TRANSACTION: i32 = 251;
    pub const TRANSACTION_IN_PROGRESS: i32 = 256;
    pub const DUPLICATE_KEY: i32 = 11000;
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A failure reported by the document store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code_name} ({code}): {message}")]
pub struct StoreError {
    pub code: i32,
    pub code_name: &'static str,
    pub message: String,
    pub labels: Vec<&'static str>,
}

impl StoreError {
    pub fn new(code: i32, code_name: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            code_name,
            message: message.into(),
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: &'static str) -> Self {
        if !self.labels.contains(&label) {
            self.labels.push(label);
        }
        self
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| *l == label)
    }

    /// Whether retrying the enclosing transaction may succeed.
    pub fn is_transient(&self) -> bool {
        self.has_label(TRANSIENT_TRANSACTION_ERROR)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, "InternalError", message)
    }

    pub fn bad_value(message: impl Into<String>) -> Self {
        Self::new(codes::BAD_VALUE, "BadValue", message)
    }

    pub fn failed_to_parse(message: impl Into<String>) -> Self {
        Self::new(codes::FAILED_TO_PARSE, "FailedToParse", message)
    }

    pub fn namespace_not_found(collection: &str) -> Self {
        Self::new(
            codes::NAMESPACE_NOT_FOUND,
            "NamespaceNotFound",
            format!("collection '{}' does not exist", collection),
        )
    }

    pub fn namespace_exists(collection: &str) -> Self {
        Self::new(
            codes::NAMESPACE_EXISTS,
            "NamespaceExists",
            format!("collection '{}' already exists", collection),
        )
    }

    pub fn immutable_field(field: &str) -> Self {
        Self::new(
            codes::IMMUTABLE_FIELD,
            "ImmutableField",
            format!("performing an update on the path '{}' would modify the immutable field", field),
        )
    }

    pub fn write_conflict() -> Self {
        Self::new(
            codes::WRITE_CONFLICT,
            "WriteConflict",
            "write conflict during transaction commit",
        )
        .with_label(TRANSIENT_TRANSACTION_ERROR)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(
            codes::DOCUMENT_VALIDATION_FAILURE,
            "DocumentValidationFailure",
            message,
        )
    }

    pub fn no_such_session() -> Self {
        Self::new(codes::NO_SUCH_SESSION, "NoSuchSession", "session has ended or never existed")
    }

    pub fn no_such_transaction() -> Self {
        Self::new(
            codes::NO_SUCH_TRANSACTION,
            "NoSuchTransaction",
            "no transaction is in progress on this session",
        )
    }

    pub fn transaction_in_progress() -> Self {
        Self::new(
            codes::TRANSACTION_IN_PROGRESS,
            "TransactionInProgress",
            "a transaction is already in progress on this session",
        )
    }

    pub fn duplicate_key(id: impl std::fmt::Display) -> Self {
        Self::new(
            codes::DUPLICATE_KEY,
            "DuplicateKey",
            format!("duplicate key: _id {}", id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_conflict_is_transient() {
        let err = StoreError::write_conflict();
        assert_eq!(err.code, codes::WRITE_CONFLICT);
        assert!(err.is_transient());
        assert!(!StoreError::bad_value("x").is_transient());
    }

    #[test]
    fn test_display() {
        let err = StoreError::namespace_exists("users");
        assert_eq!(err.to_string(), "NamespaceExists (48): collection 'users' already exists");
    }

    #[test]
    fn test_labels_are_deduplicated() {
        let err = StoreError::write_conflict().with_label(TRANSIENT_TRANSACTION_ERROR);
        assert_eq!(err.labels.len(), 1);
    }
}
