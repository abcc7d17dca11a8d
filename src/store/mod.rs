//! Document store seam
//!
//! The engine does not implement storage. It talks to a [`DocumentStore`],
//! which must provide dotted-path filtering, atomic single-document writes,
//! collection validators and multi-statement transactions.
//! [`InMemoryStore`] is the bundled implementation.

mod errors;
mod filter;
mod memory;
mod update;

pub use errors::{codes, StoreError, StoreResult, TRANSIENT_TRANSACTION_ERROR};
pub use filter::matches_filter;
pub use memory::InMemoryStore;
pub use update::apply_update;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::{Document, Value};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Handle to a store-side logical session.
///
/// The handle is a plain identifier; the store owns all session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientSession {
    id: Uuid,
}

impl ClientSession {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// How strictly a collection validator is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Off,
    /// Inserts and updates to valid documents are checked; updates to
    /// documents that were already invalid are not
    #[default]
    Moderate,
    Strict,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::Off => "off",
            ValidationLevel::Moderate => "moderate",
            ValidationLevel::Strict => "strict",
        }
    }
}

/// Options for creating or modifying a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionOptions {
    /// Validator document, either `{}` or `{"$jsonSchema": {...}}`
    pub validator: serde_json::Value,
    pub validation_level: ValidationLevel,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            validator: serde_json::json!({}),
            validation_level: ValidationLevel::default(),
        }
    }
}

/// Sort direction of an index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// An index over one or more keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexModel {
    pub keys: Vec<(String, SortDirection)>,
}

impl IndexModel {
    pub fn new(keys: Vec<(String, SortDirection)>) -> Self {
        Self { keys }
    }

    /// Conventional index name, e.g. `isSoftDeleted_-1`.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|(key, dir)| format!("{}_{}", key, dir.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Options for `find` and `find_one`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindOptions {
    /// Keys mapped to 1 (ascending) or -1 (descending); may be nested
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Options for `count`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountOptions {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl From<&FindOptions> for CountOptions {
    fn from(options: &FindOptions) -> Self {
        Self {
            skip: options.skip,
            limit: options.limit,
        }
    }
}

/// A set/unset update over dotted paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOperation {
    pub set: Document,
    pub unset: Vec<String>,
}

impl UpdateOperation {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Renders the operation in `{$set, $unset}` form, omitting empty parts.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        if !self.set.is_empty() {
            doc.insert("$set", self.set.clone());
        }
        if !self.unset.is_empty() {
            let unset: Document = self.unset.iter().map(|k| (k.clone(), Value::from(""))).collect();
            doc.insert("$unset", unset);
        }
        doc
    }
}

/// Read isolation requested for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadConcern {
    Local,
    Majority,
    Snapshot,
}

/// Acknowledgement requested for a transaction's writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteConcern {
    #[serde(rename = "1")]
    Acknowledged,
    Majority,
}

/// Which replica serves reads inside a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

/// Options applied when a transaction starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOptions {
    pub read_concern: ReadConcern,
    pub write_concern: WriteConcern,
    pub read_preference: ReadPreference,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            read_concern: ReadConcern::Majority,
            write_concern: WriteConcern::Majority,
            read_preference: ReadPreference::Primary,
        }
    }
}

/// The operations the engine needs from a document store.
///
/// Collection names are physical names. Every data operation accepts an
/// optional session; operations issued on a session with an active
/// transaction see the transaction's snapshot and its own writes.
pub trait DocumentStore: Send + Sync {
    /// Creates a collection. Fails with `NamespaceExists` if it exists and
    /// `FailedToParse` if the validator is malformed.
    fn create_collection<'a>(
        &'a self,
        name: &'a str,
        options: CollectionOptions,
    ) -> StoreFuture<'a, ()>;

    /// Replaces the validator of an existing collection.
    fn modify_collection<'a>(
        &'a self,
        name: &'a str,
        options: CollectionOptions,
    ) -> StoreFuture<'a, ()>;

    /// Creates an index and returns its name. Idempotent.
    fn create_index<'a>(&'a self, collection: &'a str, index: IndexModel) -> StoreFuture<'a, String>;

    fn count<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: CountOptions,
        session: Option<&'a ClientSession>,
    ) -> StoreFuture<'a, u64>;

    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: FindOptions,
        session: Option<&'a ClientSession>,
    ) -> StoreFuture<'a, Vec<Document>>;

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: FindOptions,
        session: Option<&'a ClientSession>,
    ) -> StoreFuture<'a, Option<Document>>;

    /// Inserts a document, generating `_id` when absent. Returns the id.
    fn insert_one<'a>(
        &'a self,
        collection: &'a str,
        document: Document,
        session: Option<&'a ClientSession>,
    ) -> StoreFuture<'a, Value>;

    /// Atomically updates the first match and returns the updated document.
    fn find_one_and_update<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: UpdateOperation,
        session: Option<&'a ClientSession>,
    ) -> StoreFuture<'a, Option<Document>>;

    /// Atomically removes the first match and returns it.
    fn find_one_and_delete<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        session: Option<&'a ClientSession>,
    ) -> StoreFuture<'a, Option<Document>>;

    fn start_session(&self) -> StoreResult<ClientSession>;

    /// Ends a session, aborting any transaction still open on it.
    fn end_session(&self, session: &ClientSession);

    fn start_transaction(
        &self,
        session: &ClientSession,
        options: &TransactionOptions,
    ) -> StoreResult<()>;

    fn commit_transaction<'a>(&'a self, session: &'a ClientSession) -> StoreFuture<'a, ()>;

    fn abort_transaction<'a>(&'a self, session: &'a ClientSession) -> StoreFuture<'a, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_update_operation_document_form() {
        let op = UpdateOperation {
            set: doc! { "name" => "a" },
            unset: vec!["age".to_string()],
        };
        assert_eq!(
            op.to_document(),
            doc! { "$set" => doc! { "name" => "a" }, "$unset" => doc! { "age" => "" } }
        );
        assert!(UpdateOperation::default().to_document().is_empty());
    }

    #[test]
    fn test_index_name() {
        let index = IndexModel::new(vec![("isSoftDeleted".to_string(), SortDirection::Descending)]);
        assert_eq!(index.name(), "isSoftDeleted_-1");
    }

    #[test]
    fn test_transaction_defaults() {
        let options = TransactionOptions::default();
        assert_eq!(options.read_concern, ReadConcern::Majority);
        assert_eq!(options.write_concern, WriteConcern::Majority);
        assert_eq!(options.read_preference, ReadPreference::Primary);
    }

    #[test]
    fn test_find_options_from_json() {
        let options: FindOptions =
            serde_json::from_value(serde_json::json!({"sort": {"name": 1}, "limit": 5})).unwrap();
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.sort, Some(doc! { "name" => 1 }));
        assert_eq!(CountOptions::from(&options).limit, Some(5));
    }
}
