//! Operation layer
//!
//! Translates query and update intents into store primitives against the
//! physical collection of one [`SchemaRegistry`].

mod dotted;

pub use dotted::{flatten, to_update_operation, FlattenMode};

use std::sync::Arc;

use tracing::trace;

use crate::error::EngineResult;
use crate::schema::{SchemaRegistry, ID_FIELD};
use crate::store::{ClientSession, CountOptions, DocumentStore, FindOptions, StoreError};
use crate::value::Document;

/// Store operations for one registered collection.
#[derive(Clone)]
pub struct CollectionOperations {
    registry: Arc<SchemaRegistry>,
}

impl CollectionOperations {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    fn store(&self) -> &dyn DocumentStore {
        self.registry.store().as_ref()
    }

    fn namespace(&self) -> &str {
        self.registry.namespace()
    }

    pub async fn count(
        &self,
        query: Document,
        options: CountOptions,
        session: Option<&ClientSession>,
    ) -> EngineResult<u64> {
        let filter = flatten(query, FlattenMode::Read);
        trace!(target: "aerodoc::store", namespace = %self.namespace(), ?filter, "count");
        Ok(self.store().count(self.namespace(), filter, options, session).await?)
    }

    pub async fn read(
        &self,
        query: Document,
        options: FindOptions,
        session: Option<&ClientSession>,
    ) -> EngineResult<Vec<Document>> {
        let filter = flatten(query, FlattenMode::Read);
        let options = flatten_sort(options);
        trace!(target: "aerodoc::store", namespace = %self.namespace(), ?filter, "find");
        Ok(self.store().find(self.namespace(), filter, options, session).await?)
    }

    pub async fn read_one(
        &self,
        query: Document,
        options: FindOptions,
        session: Option<&ClientSession>,
    ) -> EngineResult<Option<Document>> {
        let filter = flatten(query, FlattenMode::Read);
        let options = flatten_sort(options);
        trace!(target: "aerodoc::store", namespace = %self.namespace(), ?filter, "find_one");
        Ok(self.store().find_one(self.namespace(), filter, options, session).await?)
    }

    /// Inserts a document and returns it as stored.
    pub async fn create_one(
        &self,
        document: Document,
        session: Option<&ClientSession>,
    ) -> EngineResult<Document> {
        let id = self.store().insert_one(self.namespace(), document, session).await?;
        let mut filter = Document::new();
        filter.insert(ID_FIELD, id);
        self.store()
            .find_one(self.namespace(), filter, FindOptions::default(), session)
            .await?
            .ok_or_else(|| {
                StoreError::internal(format!(
                    "inserted document could not be read back from {}",
                    self.namespace()
                ))
                .into()
            })
    }

    /// Applies `data` as a set/unset update to the first match and returns
    /// the updated document.
    pub async fn update_one(
        &self,
        query: Document,
        data: Document,
        session: Option<&ClientSession>,
    ) -> EngineResult<Option<Document>> {
        let update = to_update_operation(data);
        trace!(target: "aerodoc::store", namespace = %self.namespace(), ?query, ?update, "find_one_and_update");
        Ok(self
            .store()
            .find_one_and_update(self.namespace(), query, update, session)
            .await?)
    }

    /// Removes the first match and returns it.
    pub async fn delete_one(
        &self,
        query: Document,
        session: Option<&ClientSession>,
    ) -> EngineResult<Option<Document>> {
        trace!(target: "aerodoc::store", namespace = %self.namespace(), ?query, "find_one_and_delete");
        Ok(self
            .store()
            .find_one_and_delete(self.namespace(), query, session)
            .await?)
    }
}

fn flatten_sort(mut options: FindOptions) -> FindOptions {
    options.sort = options.sort.map(|sort| flatten(sort, FlattenMode::Read));
    options
}
