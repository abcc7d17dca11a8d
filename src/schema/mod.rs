//! Schema subsystem
//!
//! Shape definitions, their `$jsonSchema` form, strict validation, and the
//! registry that binds a definition to a physical collection.

mod errors;
mod json_schema;
mod registry;
mod types;
mod validator;

pub use errors::{SchemaError, SchemaResult, Severity, ValidationDetails};
pub use json_schema::{ALL_PERSONAS, PERSONAS_KEYWORD};
pub use registry::SchemaRegistry;
pub use types::{Definition, Kind, ObjectShape, PersonaExclusion, PrimitiveKind};
pub use validator::validate_document;

/// Identifier of a managed document
pub const ID_FIELD: &str = "_id";
/// Optimistic concurrency counter, starts at 0
pub const VERSION_FIELD: &str = "version";
pub const IS_SOFT_DELETED_FIELD: &str = "isSoftDeleted";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";
pub const SOFT_DELETED_AT_FIELD: &str = "softDeletedAt";
