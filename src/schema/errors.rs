//! Schema error types
//!
//! Error codes:
//! - INVALID_SCHEMA_DEFINITION (FATAL): the definition is malformed or the
//!   store refused it as a validator
//! - SCHEMA_VALIDATION_FAILED (REJECT): a document violates the definition
//! - COLLECTION_SYNC_FAILED (REJECT): collection create/update failed for
//!   another reason

use std::fmt;

use thiserror::Error;

/// Severity levels for schema errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The offending write is rejected
    Reject,
    /// Configuration is unusable; the collection must not be served
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Where and how a document diverged from its definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDetails {
    /// Dotted path of the offending field (`$root` for the document itself)
    pub field: String,
    pub expected: String,
    pub actual: String,
}

impl ValidationDetails {
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::new(field, "present", "missing")
    }

    pub fn extra_field(field: impl Into<String>) -> Self {
        Self::new(field, "not present (undeclared)", "present")
    }

    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::new(field, expected, actual)
    }
}

impl fmt::Display for ValidationDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field '{}': expected {}, got {}",
            self.field, self.expected, self.actual
        )
    }
}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema errors
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// A definition node is malformed
    #[error("Invalid schema definition at '{path}': {reason}")]
    InvalidDefinition { path: String, reason: String },

    /// The store could not parse the derived validator
    #[error("The schema definition for collection '{collection}' is invalid: {message}")]
    UnparsableValidator { collection: String, message: String },

    /// A document does not satisfy the definition
    #[error("Document failed schema validation: {0}")]
    ValidationFailed(ValidationDetails),

    /// Creating or updating the physical collection failed
    #[error("Failed to synchronize collection '{collection}': {message}")]
    SyncFailed { collection: String, message: String },
}

impl SchemaError {
    pub fn invalid_definition(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::InvalidDefinition { .. } | SchemaError::UnparsableValidator { .. } => {
                "INVALID_SCHEMA_DEFINITION"
            }
            SchemaError::ValidationFailed(_) => "SCHEMA_VALIDATION_FAILED",
            SchemaError::SyncFailed { .. } => "COLLECTION_SYNC_FAILED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            SchemaError::InvalidDefinition { .. } | SchemaError::UnparsableValidator { .. } => {
                Severity::Fatal
            }
            _ => Severity::Reject,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
