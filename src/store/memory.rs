//! In-memory document store
//!
//! Collections keep documents in insertion order. Transactions work on a
//! private copy of every collection taken when the transaction starts and
//! publish their writes at commit. A commit fails with a transient
//! `WriteConflict` when any document it wrote was changed by someone else
//! after the snapshot was taken.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::filter::matches_filter;
use super::update::apply_update;
use super::{
    ClientSession, CollectionOptions, CountOptions, DocumentStore, FindOptions, IndexModel,
    StoreFuture, TransactionOptions, UpdateOperation, ValidationLevel,
};
use crate::schema::{validate_document, Definition};
use crate::value::{compare_values, values_equal, Document, ObjectId, Value};

#[derive(Debug, Clone)]
struct StoredDocument {
    id: Value,
    revision: u64,
    doc: Document,
}

#[derive(Debug, Clone, Default)]
struct CollectionMeta {
    validator: Option<Definition>,
    validation_level: ValidationLevel,
    indexes: Vec<IndexModel>,
}

#[derive(Debug, Default)]
struct Collection {
    meta: CollectionMeta,
    docs: Vec<StoredDocument>,
}

/// A document written inside a transaction, with the revision it had in the
/// snapshot (`None` if it did not exist).
#[derive(Debug)]
struct Touched {
    collection: String,
    id: Value,
    base_revision: Option<u64>,
}

#[derive(Debug)]
struct Transaction {
    workspace: HashMap<String, Vec<StoredDocument>>,
    touched: Vec<Touched>,
}

#[derive(Debug, Default)]
struct StoreState {
    collections: HashMap<String, Collection>,
    sessions: HashMap<Uuid, Option<Transaction>>,
    next_revision: u64,
}

impl StoreState {
    fn bump_revision(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }
}

/// Where a write lands: directly in a collection, or in a transaction's
/// workspace.
struct WriteTarget<'s> {
    docs: &'s mut Vec<StoredDocument>,
    meta: CollectionMeta,
    journal: Option<(&'s mut Vec<Touched>, &'s str)>,
    revision: Option<&'s mut u64>,
}

impl WriteTarget<'_> {
    fn record(&mut self, id: &Value, base_revision: Option<u64>) {
        if let Some((touched, collection)) = &mut self.journal {
            let seen = touched
                .iter()
                .any(|t| t.collection == *collection && values_equal(&t.id, id));
            if !seen {
                touched.push(Touched {
                    collection: collection.to_string(),
                    id: id.clone(),
                    base_revision,
                });
            }
        }
    }

    fn next_revision(&mut self) -> u64 {
        match &mut self.revision {
            Some(counter) => {
                **counter += 1;
                **counter
            }
            // Revisions inside a workspace are assigned at commit.
            None => 0,
        }
    }

    fn validate(&self, doc: &Document, previous: Option<&Document>) -> StoreResult<()> {
        let Some(validator) = &self.meta.validator else {
            return Ok(());
        };
        let check = match (self.meta.validation_level, previous) {
            (ValidationLevel::Off, _) => false,
            (ValidationLevel::Strict, _) | (ValidationLevel::Moderate, None) => true,
            (ValidationLevel::Moderate, Some(old)) => validate_document(validator, old).is_ok(),
        };
        if check {
            validate_document(validator, doc)
                .map_err(|e| StoreError::validation_failed(e.to_string()))?;
        }
        Ok(())
    }
}

/// A [`DocumentStore`] that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|e| StoreError::internal(format!("store lock poisoned: {}", e)))
    }

    /// Number of sessions started and not yet ended.
    pub fn active_sessions(&self) -> usize {
        self.lock().map(|s| s.sessions.len()).unwrap_or(0)
    }

    /// Returns the committed documents of a collection, ignoring sessions.
    pub fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.lock()
            .map(|state| {
                state
                    .collections
                    .get(collection)
                    .map(|c| c.docs.iter().map(|d| d.doc.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Names of the indexes on a collection.
    pub fn index_names(&self, collection: &str) -> Vec<String> {
        self.lock()
            .map(|state| {
                state
                    .collections
                    .get(collection)
                    .map(|c| c.meta.indexes.iter().map(IndexModel::name).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// The validator currently attached to a collection, if any.
    pub fn validator(&self, collection: &str) -> Option<(Definition, ValidationLevel)> {
        let state = self.lock().ok()?;
        let meta = &state.collections.get(collection)?.meta;
        meta.validator
            .clone()
            .map(|validator| (validator, meta.validation_level))
    }

    fn read<R>(
        &self,
        collection: &str,
        session: Option<&ClientSession>,
        op: impl FnOnce(&[StoredDocument]) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let state = self.lock()?;
        if let Some(session) = session {
            let transaction = state
                .sessions
                .get(&session.id())
                .ok_or_else(StoreError::no_such_session)?;
            if let Some(txn) = transaction {
                let docs = txn.workspace.get(collection).map(Vec::as_slice).unwrap_or(&[]);
                return op(docs);
            }
        }
        let docs = state
            .collections
            .get(collection)
            .map(|c| c.docs.as_slice())
            .unwrap_or(&[]);
        op(docs)
    }

    fn write<R>(
        &self,
        collection: &str,
        session: Option<&ClientSession>,
        op: impl FnOnce(&mut WriteTarget<'_>) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let meta = state
            .collections
            .get(collection)
            .map(|c| c.meta.clone())
            .unwrap_or_default();

        if let Some(session) = session {
            let transaction = state
                .sessions
                .get_mut(&session.id())
                .ok_or_else(StoreError::no_such_session)?;
            if let Some(txn) = transaction {
                let docs = txn.workspace.entry(collection.to_string()).or_default();
                let mut target = WriteTarget {
                    docs,
                    meta,
                    journal: Some((&mut txn.touched, collection)),
                    revision: None,
                };
                return op(&mut target);
            }
        }

        let docs = &mut state.collections.entry(collection.to_string()).or_default().docs;
        let mut target = WriteTarget {
            docs,
            meta,
            journal: None,
            revision: Some(&mut state.next_revision),
        };
        op(&mut target)
    }
}

fn parse_validator(options: &CollectionOptions) -> StoreResult<Option<Definition>> {
    let obj = options
        .validator
        .as_object()
        .ok_or_else(|| StoreError::failed_to_parse("validator must be an object"))?;
    if obj.is_empty() {
        return Ok(None);
    }
    if obj.len() != 1 {
        return Err(StoreError::failed_to_parse(
            "only a single $jsonSchema validator is supported",
        ));
    }
    let schema = obj
        .get("$jsonSchema")
        .ok_or_else(|| StoreError::failed_to_parse("only $jsonSchema validators are supported"))?;
    Definition::from_json_schema(schema, false)
        .map(Some)
        .map_err(|e| StoreError::failed_to_parse(e.to_string()))
}

fn matching<'d>(
    docs: &'d [StoredDocument],
    filter: &Document,
) -> StoreResult<Vec<&'d StoredDocument>> {
    let mut out = Vec::new();
    for stored in docs {
        if matches_filter(&stored.doc, filter)? {
            out.push(stored);
        }
    }
    Ok(out)
}

fn sort_documents(docs: &mut [&StoredDocument], sort: &Document) -> StoreResult<()> {
    let mut keys = Vec::with_capacity(sort.len());
    for (path, direction) in sort.iter() {
        let descending = match direction.as_f64() {
            Some(n) if n < 0.0 => true,
            Some(n) if n > 0.0 => false,
            _ => {
                return Err(StoreError::bad_value(format!(
                    "sort direction for '{}' must be 1 or -1",
                    path
                )))
            }
        };
        keys.push((path, descending));
    }
    docs.sort_by(|a, b| {
        for (path, descending) in &keys {
            let left = a.doc.get_path(path).unwrap_or(&Value::Null);
            let right = b.doc.get_path(path).unwrap_or(&Value::Null);
            let ord = compare_values(left, right);
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
    Ok(())
}

fn window<T>(items: Vec<T>, skip: Option<u64>, limit: Option<u64>) -> Vec<T> {
    let skip = skip.unwrap_or(0) as usize;
    let iter = items.into_iter().skip(skip);
    match limit {
        Some(limit) if limit > 0 => iter.take(limit as usize).collect(),
        _ => iter.collect(),
    }
}

fn find_documents(
    docs: &[StoredDocument],
    filter: &Document,
    options: &FindOptions,
) -> StoreResult<Vec<Document>> {
    let mut found = matching(docs, filter)?;
    if let Some(sort) = &options.sort {
        sort_documents(&mut found, sort)?;
    }
    Ok(window(found, options.skip, options.limit)
        .into_iter()
        .map(|stored| stored.doc.clone())
        .collect())
}

fn position_of(docs: &[StoredDocument], filter: &Document) -> StoreResult<Option<usize>> {
    for (index, stored) in docs.iter().enumerate() {
        if matches_filter(&stored.doc, filter)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

impl DocumentStore for InMemoryStore {
    fn create_collection<'a>(
        &'a self,
        name: &'a str,
        options: CollectionOptions,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let validator = parse_validator(&options)?;
            let mut state = self.lock()?;
            if state.collections.contains_key(name) {
                return Err(StoreError::namespace_exists(name));
            }
            state.collections.insert(
                name.to_string(),
                Collection {
                    meta: CollectionMeta {
                        validator,
                        validation_level: options.validation_level,
                        indexes: Vec::new(),
                    },
                    docs: Vec::new(),
                },
            );
            debug!(target: "aerodoc::store", collection = name, "Collection created");
            Ok(())
        })
    }

    fn modify_collection<'a>(
        &'a self,
        name: &'a str,
        options: CollectionOptions,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let validator = parse_validator(&options)?;
            let mut state = self.lock()?;
            let collection = state
                .collections
                .get_mut(name)
                .ok_or_else(|| StoreError::namespace_not_found(name))?;
            collection.meta.validator = validator;
            collection.meta.validation_level = options.validation_level;
            debug!(target: "aerodoc::store", collection = name, "Collection modified");
            Ok(())
        })
    }

    fn create_index<'a>(&'a self, collection: &'a str, index: IndexModel) -> StoreFuture<'a, String> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let meta = &mut state.collections.entry(collection.to_string()).or_default().meta;
            let name = index.name();
            if !meta.indexes.contains(&index) {
                meta.indexes.push(index);
            }
            Ok(name)
        })
    }

    fn count<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: CountOptions,
        session: Option<&'a ClientSession>,
    ) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            self.read(collection, session, |docs| {
                let found = matching(docs, &filter)?;
                Ok(window(found, options.skip, options.limit).len() as u64)
            })
        })
    }

    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: FindOptions,
        session: Option<&'a ClientSession>,
    ) -> StoreFuture<'a, Vec<Document>> {
        Box::pin(async move {
            self.read(collection, session, |docs| find_documents(docs, &filter, &options))
        })
    }

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: FindOptions,
        session: Option<&'a ClientSession>,
    ) -> StoreFuture<'a, Option<Document>> {
        Box::pin(async move {
            let options = options.with_limit(1);
            self.read(collection, session, |docs| {
                Ok(find_documents(docs, &filter, &options)?.into_iter().next())
            })
        })
    }

    fn insert_one<'a>(
        &'a self,
        collection: &'a str,
        document: Document,
        session: Option<&'a ClientSession>,
    ) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            let mut doc = document;
            let id = match doc.get("_id").cloned() {
                Some(id) => id,
                None => {
                    let id = Value::ObjectId(ObjectId::new());
                    let mut with_id = Document::new();
                    with_id.insert("_id", id.clone());
                    for (k, v) in doc {
                        with_id.insert(k, v);
                    }
                    doc = with_id;
                    id
                }
            };

            self.write(collection, session, |target| {
                if target.docs.iter().any(|d| values_equal(&d.id, &id)) {
                    return Err(StoreError::duplicate_key(&id));
                }
                target.validate(&doc, None)?;
                target.record(&id, None);
                let revision = target.next_revision();
                target.docs.push(StoredDocument {
                    id: id.clone(),
                    revision,
                    doc,
                });
                Ok(id)
            })
        })
    }

    fn find_one_and_update<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: UpdateOperation,
        session: Option<&'a ClientSession>,
    ) -> StoreFuture<'a, Option<Document>> {
        Box::pin(async move {
            self.write(collection, session, |target| {
                let Some(index) = position_of(target.docs, &filter)? else {
                    return Ok(None);
                };
                let mut updated = target.docs[index].doc.clone();
                apply_update(&mut updated, &update)?;
                target.validate(&updated, Some(&target.docs[index].doc))?;

                let id = target.docs[index].id.clone();
                let base = target.docs[index].revision;
                target.record(&id, Some(base));
                let revision = target.next_revision();
                let stored = &mut target.docs[index];
                stored.doc = updated.clone();
                stored.revision = revision;
                Ok(Some(updated))
            })
        })
    }

    fn find_one_and_delete<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        session: Option<&'a ClientSession>,
    ) -> StoreFuture<'a, Option<Document>> {
        Box::pin(async move {
            self.write(collection, session, |target| {
                let Some(index) = position_of(target.docs, &filter)? else {
                    return Ok(None);
                };
                let id = target.docs[index].id.clone();
                let base = target.docs[index].revision;
                target.record(&id, Some(base));
                Ok(Some(target.docs.remove(index).doc))
            })
        })
    }

    fn start_session(&self) -> StoreResult<ClientSession> {
        let session = ClientSession::new();
        self.lock()?.sessions.insert(session.id(), None);
        debug!(target: "aerodoc::store", session = %session, "Session started");
        Ok(session)
    }

    fn end_session(&self, session: &ClientSession) {
        if let Ok(mut state) = self.lock() {
            if let Some(Some(_)) = state.sessions.remove(&session.id()) {
                debug!(target: "aerodoc::store", session = %session, "Open transaction discarded on session end");
            }
        }
    }

    fn start_transaction(
        &self,
        session: &ClientSession,
        _options: &TransactionOptions,
    ) -> StoreResult<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let slot = state
            .sessions
            .get_mut(&session.id())
            .ok_or_else(StoreError::no_such_session)?;
        if slot.is_some() {
            return Err(StoreError::transaction_in_progress());
        }
        let workspace = state
            .collections
            .iter()
            .map(|(name, c)| (name.clone(), c.docs.clone()))
            .collect();
        *slot = Some(Transaction {
            workspace,
            touched: Vec::new(),
        });
        Ok(())
    }

    fn commit_transaction<'a>(&'a self, session: &'a ClientSession) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut guard = self.lock()?;
            let state = &mut *guard;
            let txn = state
                .sessions
                .get_mut(&session.id())
                .ok_or_else(StoreError::no_such_session)?
                .take()
                .ok_or_else(StoreError::no_such_transaction)?;

            for touched in &txn.touched {
                let current = state
                    .collections
                    .get(&touched.collection)
                    .and_then(|c| c.docs.iter().find(|d| values_equal(&d.id, &touched.id)))
                    .map(|d| d.revision);
                if current != touched.base_revision {
                    debug!(target: "aerodoc::store", session = %session, "Write conflict at commit");
                    return Err(StoreError::write_conflict());
                }
            }

            for touched in &txn.touched {
                let written = txn
                    .workspace
                    .get(&touched.collection)
                    .and_then(|docs| docs.iter().find(|d| values_equal(&d.id, &touched.id)))
                    .cloned();
                let revision = state.bump_revision();
                let docs = &mut state
                    .collections
                    .entry(touched.collection.clone())
                    .or_default()
                    .docs;
                let existing = docs.iter().position(|d| values_equal(&d.id, &touched.id));
                match (written, existing) {
                    (Some(mut doc), Some(index)) => {
                        doc.revision = revision;
                        docs[index] = doc;
                    }
                    (Some(mut doc), None) => {
                        doc.revision = revision;
                        docs.push(doc);
                    }
                    (None, Some(index)) => {
                        docs.remove(index);
                    }
                    (None, None) => {}
                }
            }
            Ok(())
        })
    }

    fn abort_transaction<'a>(&'a self, session: &'a ClientSession) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock()?;
            state
                .sessions
                .get_mut(&session.id())
                .ok_or_else(StoreError::no_such_session)?
                .take()
                .ok_or_else(StoreError::no_such_transaction)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::store::codes;
    use serde_json::json;

    fn validator() -> CollectionOptions {
        CollectionOptions {
            validator: json!({"$jsonSchema": {
                "bsonType": "object",
                "properties": {"name": {"bsonType": "string"}},
                "required": ["name"]
            }}),
            validation_level: ValidationLevel::Moderate,
        }
    }

    #[tokio::test]
    async fn test_insert_generates_id_and_find_returns_it() {
        let store = InMemoryStore::new();
        let id = store.insert_one("people", doc! { "name" => "a" }, None).await.unwrap();
        assert!(matches!(id, Value::ObjectId(_)));

        let found = store
            .find_one("people", doc! { "_id" => id.clone() }, FindOptions::default(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.keys().next(), Some("_id"));
        assert_eq!(found.get("name"), Some(&Value::from("a")));
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = InMemoryStore::new();
        store.insert_one("c", doc! { "_id" => 1 }, None).await.unwrap();
        let err = store.insert_one("c", doc! { "_id" => 1 }, None).await.unwrap_err();
        assert_eq!(err.code, codes::DUPLICATE_KEY);
    }

    #[tokio::test]
    async fn test_sort_skip_limit_and_count() {
        let store = InMemoryStore::new();
        for (name, age) in [("c", 3), ("a", 1), ("b", 2), ("d", 4)] {
            store.insert_one("p", doc! { "name" => name, "age" => age }, None).await.unwrap();
        }
        let options = FindOptions::default()
            .with_sort(doc! { "age" => -1 })
            .with_skip(1)
            .with_limit(2);
        let names: Vec<_> = store
            .find("p", doc! {}, options, None)
            .await
            .unwrap()
            .iter()
            .map(|d| d.get("name").cloned().unwrap())
            .collect();
        assert_eq!(names, vec![Value::from("c"), Value::from("b")]);

        let count = store
            .count("p", doc! { "age" => doc! { "$gt" => 1 } }, CountOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(count, 3);
        let limited = store
            .count("p", doc! {}, CountOptions { skip: Some(1), limit: Some(2) }, None)
            .await
            .unwrap();
        assert_eq!(limited, 2);
    }

    #[tokio::test]
    async fn test_find_one_and_update_returns_post_image() {
        let store = InMemoryStore::new();
        store.insert_one("c", doc! { "_id" => 1, "v" => 0 }, None).await.unwrap();
        let update = UpdateOperation {
            set: doc! { "v" => 1 },
            unset: vec![],
        };
        let updated = store
            .find_one_and_update("c", doc! { "_id" => 1, "v" => 0 }, update.clone(), None)
            .await
            .unwrap();
        assert_eq!(updated, Some(doc! { "_id" => 1, "v" => 1 }));

        let missed = store
            .find_one_and_update("c", doc! { "_id" => 1, "v" => 0 }, update, None)
            .await
            .unwrap();
        assert!(missed.is_none());
    }

    #[tokio::test]
    async fn test_find_one_and_delete() {
        let store = InMemoryStore::new();
        store.insert_one("c", doc! { "_id" => 1 }, None).await.unwrap();
        let removed = store.find_one_and_delete("c", doc! { "_id" => 1 }, None).await.unwrap();
        assert_eq!(removed, Some(doc! { "_id" => 1 }));
        assert!(store.find_one_and_delete("c", doc! { "_id" => 1 }, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_collection_lifecycle_codes() {
        let store = InMemoryStore::new();
        store.create_collection("c", validator()).await.unwrap();
        let err = store.create_collection("c", validator()).await.unwrap_err();
        assert_eq!(err.code, codes::NAMESPACE_EXISTS);

        let err = store.modify_collection("missing", validator()).await.unwrap_err();
        assert_eq!(err.code, codes::NAMESPACE_NOT_FOUND);

        let bad = CollectionOptions {
            validator: json!({"$jsonSchema": {"bsonType": "object"}}),
            validation_level: ValidationLevel::Moderate,
        };
        let err = store.create_collection("d", bad).await.unwrap_err();
        assert_eq!(err.code, codes::FAILED_TO_PARSE);
    }

    #[tokio::test]
    async fn test_inserts_are_validated() {
        let store = InMemoryStore::new();
        store.create_collection("c", validator()).await.unwrap();
        let err = store.insert_one("c", doc! { "age" => 1 }, None).await.unwrap_err();
        assert_eq!(err.code, codes::DOCUMENT_VALIDATION_FAILURE);
        assert!(store.insert_one("c", doc! { "name" => "a" }, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_moderate_level_exempts_already_invalid_documents() {
        let store = InMemoryStore::new();
        store.create_collection("c", CollectionOptions::default()).await.unwrap();
        store.insert_one("c", doc! { "_id" => 1 }, None).await.unwrap();
        store.insert_one("c", doc! { "_id" => 2, "name" => "ok" }, None).await.unwrap();
        store.modify_collection("c", validator()).await.unwrap();

        let set_x = UpdateOperation {
            set: doc! { "x" => 1 },
            unset: vec![],
        };
        assert!(store
            .find_one_and_update("c", doc! { "_id" => 1 }, set_x, None)
            .await
            .is_ok());

        let unset_name = UpdateOperation {
            set: Document::new(),
            unset: vec!["name".to_string()],
        };
        let err = store
            .find_one_and_update("c", doc! { "_id" => 2 }, unset_name, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::DOCUMENT_VALIDATION_FAILURE);
    }

    #[tokio::test]
    async fn test_transaction_isolation_and_commit() {
        let store = InMemoryStore::new();
        let session = store.start_session().unwrap();
        store.start_transaction(&session, &TransactionOptions::default()).unwrap();
        store.insert_one("c", doc! { "_id" => 1 }, Some(&session)).await.unwrap();

        assert_eq!(store.count("c", doc! {}, CountOptions::default(), Some(&session)).await.unwrap(), 1);
        assert_eq!(store.count("c", doc! {}, CountOptions::default(), None).await.unwrap(), 0);

        store.commit_transaction(&session).await.unwrap();
        assert_eq!(store.count("c", doc! {}, CountOptions::default(), None).await.unwrap(), 1);
        store.end_session(&session);
        assert_eq!(store.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_abort_discards_writes() {
        let store = InMemoryStore::new();
        let session = store.start_session().unwrap();
        store.start_transaction(&session, &TransactionOptions::default()).unwrap();
        store.insert_one("c", doc! { "_id" => 1 }, Some(&session)).await.unwrap();
        store.abort_transaction(&session).await.unwrap();
        assert!(store.snapshot("c").is_empty());
        let err = store.abort_transaction(&session).await.unwrap_err();
        assert_eq!(err.code, codes::NO_SUCH_TRANSACTION);
    }

    #[tokio::test]
    async fn test_first_committer_wins() {
        let store = InMemoryStore::new();
        store.insert_one("c", doc! { "_id" => 1, "v" => 0 }, None).await.unwrap();

        let a = store.start_session().unwrap();
        let b = store.start_session().unwrap();
        store.start_transaction(&a, &TransactionOptions::default()).unwrap();
        store.start_transaction(&b, &TransactionOptions::default()).unwrap();

        let bump = UpdateOperation {
            set: doc! { "v" => 1 },
            unset: vec![],
        };
        let filter = doc! { "_id" => 1, "v" => 0 };
        assert!(store.find_one_and_update("c", filter.clone(), bump.clone(), Some(&a)).await.unwrap().is_some());
        assert!(store.find_one_and_update("c", filter, bump, Some(&b)).await.unwrap().is_some());

        store.commit_transaction(&a).await.unwrap();
        let err = store.commit_transaction(&b).await.unwrap_err();
        assert_eq!(err.code, codes::WRITE_CONFLICT);
        assert!(err.is_transient());
        assert_eq!(store.snapshot("c"), vec![doc! { "_id" => 1, "v" => 1 }]);
    }

    #[tokio::test]
    async fn test_ended_session_cannot_be_used() {
        let store = InMemoryStore::new();
        let session = store.start_session().unwrap();
        store.end_session(&session);
        let err = store
            .find("c", doc! {}, FindOptions::default(), Some(&session))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::NO_SUCH_SESSION);
    }

    #[tokio::test]
    async fn test_create_index_is_idempotent() {
        let store = InMemoryStore::new();
        let index = IndexModel::new(vec![("isSoftDeleted".into(), crate::store::SortDirection::Descending)]);
        store.create_index("c", index.clone()).await.unwrap();
        store.create_index("c", index).await.unwrap();
        assert_eq!(store.index_names("c"), vec!["isSoftDeleted_-1".to_string()]);
    }
}
