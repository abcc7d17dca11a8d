//! aerodoc - A layered, schema-validated document data-access engine
//!
//! Sits between HTTP handlers and a document store. Requests are validated
//! per region, coerced against collection definitions, and run through
//! business rules: optimistic versioning, soft deletion, existence policies
//! and persona redaction. Sessions propagate through nested calls so any
//! layer can join an ambient transaction or open its own.
//!
//! Layers, outermost first:
//! - [`request`]: request region validation
//! - [`http`]: response envelopes and error mapping
//! - [`service`]: facade, business rules and data access
//! - [`session`]: session ownership and transactions
//! - [`operation`]: dot-flattening onto store primitives
//! - [`coerce`]: value coercion against definitions
//! - [`schema`]: definitions and collection binding
//! - [`store`]: the document store seam and an in-memory store

pub mod coerce;
pub mod config;
pub mod error;
pub mod http;
pub mod operation;
pub mod registry;
pub mod request;
pub mod schema;
pub mod service;
pub mod session;
pub mod store;
pub mod value;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, ErrorCategory};
pub use value::{Document, ObjectId, Value};
