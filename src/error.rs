//! Engine error taxonomy
//!
//! Every failure the engine surfaces falls into one of four categories:
//! client input, document existence, developer/configuration, or store.
//! The transport boundary maps categories to status codes.

use thiserror::Error;

use crate::schema::SchemaError;
use crate::store::StoreError;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Broad classification used at the transport boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    ClientInput,
    Existence,
    Developer,
    Store,
}

/// Engine errors
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    // ==================
    // Client input
    // ==================
    /// Malformed input or failed coercion
    #[error("{message}")]
    BadRequest { code: String, message: String },

    /// Input that must not be sent
    #[error("{message}")]
    Forbidden { code: String, message: String },

    /// Supplied version differs from the stored one
    #[error("The document's latest version is {latest}, yours is {yours}.")]
    VersionConflict { latest: i64, yours: i64 },

    // ==================
    // Existence
    // ==================
    #[error("The document does not exist.")]
    DocumentNotFound,

    #[error("You are supposed to find 1 document for this query, but you found {count} documents instead.")]
    MultipleDocumentsFound { count: usize },

    // ==================
    // Developer
    // ==================
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ==================
    // Store
    // ==================
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
        }
    }

    /// A generic client-input failure.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::bad_request("BAD_REQUEST", message)
    }

    pub fn forbidden(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn code(&self) -> &str {
        match self {
            EngineError::BadRequest { code, .. } | EngineError::Forbidden { code, .. } => code,
            EngineError::VersionConflict { .. } => "DOCUMENT_INVALID_VERSION",
            EngineError::DocumentNotFound => "DOCUMENT_NOT_FOUND",
            EngineError::MultipleDocumentsFound { .. } => "MORE_THAN_1_DOCUMENT_FOUND",
            EngineError::Schema(e) => e.code(),
            EngineError::InvalidArgument(_) => "INVALID_ARGUMENT",
            EngineError::Store(e) => e.code_name,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::BadRequest { .. }
            | EngineError::Forbidden { .. }
            | EngineError::VersionConflict { .. } => ErrorCategory::ClientInput,
            EngineError::DocumentNotFound | EngineError::MultipleDocumentsFound { .. } => {
                ErrorCategory::Existence
            }
            EngineError::Schema(_) | EngineError::InvalidArgument(_) => ErrorCategory::Developer,
            EngineError::Store(_) => ErrorCategory::Store,
        }
    }

    /// Whether the enclosing transaction may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Store(e) if e.is_transient())
    }
}
