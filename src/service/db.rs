//! Data-access service: coercion and hooks over the operation layer.

use std::sync::Arc;

use crate::coerce::{Coercer, Layer};
use crate::error::EngineResult;
use crate::operation::CollectionOperations;
use crate::schema::SchemaRegistry;
use crate::store::{ClientSession, CountOptions, FindOptions};
use crate::value::Document;

use super::hooks::{
    run_hook, CountHooks, CreateHooks, DeleteHooks, ReadHooks, ReadOneHooks, UpdateHooks,
};

/// Coerces inputs against the registry's definition, runs hooks and
/// delegates to [`CollectionOperations`]. Sessions are passed through
/// untouched.
#[derive(Clone)]
pub struct DbService {
    operations: CollectionOperations,
    coercer: Coercer,
}

impl DbService {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            operations: CollectionOperations::new(registry),
            coercer: Coercer::new(Layer::Db),
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        self.operations.registry()
    }

    pub async fn count(
        &self,
        query: Document,
        options: CountOptions,
        session: Option<&ClientSession>,
        hooks: &CountHooks,
    ) -> EngineResult<u64> {
        let mut query = self.coercer.coerce_filter(query, self.registry().definition())?;
        run_hook(&hooks.before_count, &mut query, session).await?;
        let mut count = self.operations.count(query, options, session).await?;
        run_hook(&hooks.after_count, &mut count, session).await?;
        Ok(count)
    }

    pub async fn read(
        &self,
        query: Document,
        options: FindOptions,
        session: Option<&ClientSession>,
        hooks: &ReadHooks,
    ) -> EngineResult<Vec<Document>> {
        let definition = self.registry().definition();
        let mut query = self.coercer.coerce_filter(query, definition)?;
        let options = self.coercer.coerce_find_options(options, definition)?;
        run_hook(&hooks.before_read, &mut query, session).await?;
        let mut documents = self.operations.read(query, options, session).await?;
        run_hook(&hooks.after_read, &mut documents, session).await?;
        Ok(documents)
    }

    pub async fn read_one(
        &self,
        query: Document,
        options: FindOptions,
        session: Option<&ClientSession>,
        hooks: &ReadOneHooks,
    ) -> EngineResult<Option<Document>> {
        let definition = self.registry().definition();
        let mut query = self.coercer.coerce_filter(query, definition)?;
        let options = self.coercer.coerce_find_options(options, definition)?;
        run_hook(&hooks.before_read_one, &mut query, session).await?;
        let mut document = self.operations.read_one(query, options, session).await?;
        run_hook(&hooks.after_read_one, &mut document, session).await?;
        Ok(document)
    }

    pub async fn create_one(
        &self,
        data: Document,
        session: Option<&ClientSession>,
        hooks: &CreateHooks,
    ) -> EngineResult<Document> {
        let mut data = self.coercer.coerce_document(data, self.registry().definition())?;
        run_hook(&hooks.before_create, &mut data, session).await?;
        let mut document = self.operations.create_one(data, session).await?;
        run_hook(&hooks.after_create, &mut document, session).await?;
        Ok(document)
    }

    pub async fn update_one(
        &self,
        query: Document,
        data: Document,
        session: Option<&ClientSession>,
        hooks: &UpdateHooks,
    ) -> EngineResult<Option<Document>> {
        let definition = self.registry().definition();
        let mut query = self.coercer.coerce_filter(query, definition)?;
        let mut data = self.coercer.coerce_update(data, definition)?;
        if let Some(hook) = &hooks.before_update {
            hook(&mut query, &mut data, session).await?;
        }
        let mut document = self.operations.update_one(query, data, session).await?;
        run_hook(&hooks.after_update, &mut document, session).await?;
        Ok(document)
    }

    pub async fn delete_one(
        &self,
        query: Document,
        session: Option<&ClientSession>,
        hooks: &DeleteHooks,
    ) -> EngineResult<Option<Document>> {
        let mut query = self.coercer.coerce_filter(query, self.registry().definition())?;
        run_hook(&hooks.before_delete, &mut query, session).await?;
        let mut document = self.operations.delete_one(query, session).await?;
        run_hook(&hooks.after_delete, &mut document, session).await?;
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::doc;
    use crate::schema::Definition;
    use crate::store::InMemoryStore;
    use crate::value::Value;

    async fn service() -> DbService {
        let store = Arc::new(InMemoryStore::new());
        let definition = Definition::object()
            .property("name", Definition::string())
            .property("age", Definition::int32());
        let registry =
            SchemaRegistry::new(store, "app", "people", definition, SchemaConfig::default()).unwrap();
        registry.synchronized().await.unwrap();
        DbService::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_inputs_are_coerced() {
        let db = service().await;
        let created = db
            .create_one(
                doc! { "name" => "a", "age" => "40", "version" => 0, "isSoftDeleted" => false, "createdAt" => "2024-01-01T00:00:00Z", "junk" => 1 },
                None,
                &CreateHooks::default(),
            )
            .await
            .unwrap();
        assert_eq!(created.get("age"), Some(&Value::Int32(40)));
        assert!(!created.contains_key("junk"));

        let count = db
            .count(doc! { "age" => "40" }, CountOptions::default(), None, &CountHooks::default())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_hooks_see_coerced_values() {
        let db = service().await;
        let hooks = ReadOneHooks::new()
            .before_read_one(|query, _| {
                Box::pin(async move {
                    assert_eq!(query.get("age"), Some(&Value::Int32(3)));
                    query.insert("name", "b");
                    Ok(())
                })
            })
            .after_read_one(|document, _| {
                Box::pin(async move {
                    assert!(document.is_none());
                    Ok(())
                })
            });
        let found = db
            .read_one(doc! { "age" => "3" }, FindOptions::default(), None, &hooks)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_coercion_failures_stop_before_the_store() {
        let db = service().await;
        let err = db
            .read(doc! { "age" => "old" }, FindOptions::default(), None, &ReadHooks::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");
    }
}
