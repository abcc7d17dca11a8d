//! Facade service: the entry point the transport boundary calls.
//!
//! Combines read and count for paginated listings and insists on an
//! identifier and a version for every by-id operation. Each call runs under
//! one outer session that the business-rule layer joins.

use serde::Serialize;

use crate::coerce::{Coercer, Layer};
use crate::error::EngineResult;
use crate::schema::Definition;
use crate::store::{ClientSession, CountOptions, FindOptions};
use crate::value::{Document, Value};

use super::application::ApplicationService;
use super::hooks::{CountHooks, CreateHooks, DeleteHooks, ReadHooks, ReadOneHooks, UpdateHooks};

/// A page of documents plus the total number of matches
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadResult {
    pub documents: Vec<Document>,
    pub count: u64,
}

#[derive(Clone)]
pub struct ControllerService {
    application: ApplicationService,
    coercer: Coercer,
}

impl ControllerService {
    pub fn new(application: ApplicationService) -> Self {
        Self {
            application,
            coercer: Coercer::new(Layer::Controller),
        }
    }

    pub fn application(&self) -> &ApplicationService {
        &self.application
    }

    /// Reads one page and counts every match of `query`.
    pub async fn read(
        &self,
        query: Document,
        options: FindOptions,
        session: Option<&ClientSession>,
        read_hooks: &ReadHooks,
        count_hooks: &CountHooks,
    ) -> EngineResult<ReadResult> {
        let definition = self.application.registry().definition();
        let query = self.coercer.coerce_filter(query, definition)?;
        let options = self.coercer.coerce_find_options(options, definition)?;
        let scope = self
            .application
            .sessions()
            .start(session, read_hooks.flags.session_enabled, false)?;
        scope
            .run(|session| {
                let query = query.clone();
                let options = options.clone();
                async move {
                    let session = session.as_ref();
                    let documents = self
                        .application
                        .read(query.clone(), options, session, read_hooks)
                        .await?;
                    let count = self
                        .application
                        .count(query, CountOptions::default(), session, count_hooks)
                        .await?;
                    Ok(ReadResult { documents, count })
                }
            })
            .await
    }

    pub async fn read_one_by_id(
        &self,
        id: Option<Value>,
        session: Option<&ClientSession>,
        hooks: &ReadOneHooks,
    ) -> EngineResult<Option<Document>> {
        let id = self.require_id(id)?;
        let scope = self
            .application
            .sessions()
            .start(session, hooks.flags.session_enabled, false)?;
        scope
            .run(|session| {
                let id = id.clone();
                async move {
                    self.application
                        .read_one_by_id(id, session.as_ref(), hooks)
                        .await
                }
            })
            .await
    }

    pub async fn create_one(
        &self,
        data: Document,
        session: Option<&ClientSession>,
        hooks: &CreateHooks,
    ) -> EngineResult<Document> {
        let data = self
            .coercer
            .coerce_document(data, self.application.registry().definition())?;
        let scope = self
            .application
            .sessions()
            .start(session, hooks.flags.session_enabled, true)?;
        scope
            .run(|session| {
                let data = data.clone();
                async move {
                    self.application
                        .create_one(data, session.as_ref(), hooks)
                        .await
                }
            })
            .await
    }

    pub async fn update_one_by_id_and_version(
        &self,
        id: Option<Value>,
        version: Option<Value>,
        data: Document,
        session: Option<&ClientSession>,
        hooks: &UpdateHooks,
    ) -> EngineResult<Option<Document>> {
        let id = self.require_id(id)?;
        let version = self.require_version(version)?;
        let data = self
            .coercer
            .coerce_update(data, self.application.registry().definition())?;
        let scope = self
            .application
            .sessions()
            .start(session, hooks.flags.session_enabled, true)?;
        scope
            .run(|session| {
                let id = id.clone();
                let version = version.clone();
                let data = data.clone();
                async move {
                    self.application
                        .update_one_by_id_and_version(id, version, data, session.as_ref(), hooks)
                        .await
                }
            })
            .await
    }

    pub async fn soft_delete_one_by_id_and_version(
        &self,
        id: Option<Value>,
        version: Option<Value>,
        session: Option<&ClientSession>,
        hooks: &DeleteHooks,
    ) -> EngineResult<Option<Document>> {
        let id = self.require_id(id)?;
        let version = self.require_version(version)?;
        let scope = self
            .application
            .sessions()
            .start(session, hooks.flags.session_enabled, true)?;
        scope
            .run(|session| {
                let id = id.clone();
                let version = version.clone();
                async move {
                    self.application
                        .soft_delete_one_by_id_and_version(id, version, session.as_ref(), hooks)
                        .await
                }
            })
            .await
    }

    pub async fn delete_one_by_id_and_version(
        &self,
        id: Option<Value>,
        version: Option<Value>,
        session: Option<&ClientSession>,
        hooks: &DeleteHooks,
    ) -> EngineResult<Option<Document>> {
        let id = self.require_id(id)?;
        let version = self.require_version(version)?;
        let scope = self
            .application
            .sessions()
            .start(session, hooks.flags.session_enabled, true)?;
        scope
            .run(|session| {
                let id = id.clone();
                let version = version.clone();
                async move {
                    self.application
                        .delete_one_by_id_and_version(id, version, session.as_ref(), hooks)
                        .await
                }
            })
            .await
    }

    fn require_id(&self, id: Option<Value>) -> EngineResult<Value> {
        self.coercer.coerce(id, &Definition::object_id(), true)
    }

    fn require_version(&self, version: Option<Value>) -> EngineResult<Value> {
        self.coercer.coerce(version, &Definition::int32(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::doc;
    use crate::error::EngineError;
    use crate::schema::SchemaRegistry;
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    async fn controller() -> (Arc<InMemoryStore>, ControllerService) {
        let store = Arc::new(InMemoryStore::new());
        let definition = Definition::object()
            .property("name", Definition::string())
            .property("rank", Definition::int32())
            .required(["name"]);
        let config = EngineConfig::default();
        let registry =
            SchemaRegistry::new(store.clone(), "app", "people", definition, config.schema).unwrap();
        registry.synchronized().await.unwrap();
        let application = ApplicationService::new(Arc::new(registry), &config).unwrap();
        (store, ControllerService::new(application))
    }

    #[tokio::test]
    async fn test_read_combines_page_and_total() {
        let (_store, controller) = controller().await;
        for rank in 0..5 {
            controller
                .create_one(doc! { "name" => "n", "rank" => rank }, None, &CreateHooks::default())
                .await
                .unwrap();
        }
        let result = controller
            .read(
                doc! { "rank" => doc! { "$gte" => "1" } },
                FindOptions::default().with_sort(doc! { "rank" => -1 }).with_limit(2),
                None,
                &ReadHooks::default(),
                &CountHooks::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.count, 4);
        let ranks: Vec<_> = result.documents.iter().filter_map(|d| d.get("rank")).cloned().collect();
        assert_eq!(ranks, vec![Value::Int32(4), Value::Int32(3)]);
    }

    #[tokio::test]
    async fn test_by_id_operations_require_id_and_version() {
        let (_store, controller) = controller().await;
        let err = controller
            .read_one_by_id(None, None, &ReadOneHooks::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");

        let created = controller
            .create_one(doc! { "name" => "a" }, None, &CreateHooks::default())
            .await
            .unwrap();
        let id = created.get("_id").cloned();
        let err = controller
            .delete_one_by_id_and_version(id, None, None, &DeleteHooks::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_boundary_rejects_unknown_properties() {
        let (_store, controller) = controller().await;
        let err = controller
            .create_one(doc! { "name" => "a", "extra" => 1 }, None, &CreateHooks::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRequest { .. }));
        assert_eq!(err.code(), "UNKNOWN_PROPERTY");
    }

    #[tokio::test]
    async fn test_writes_share_one_outer_session() {
        let (store, controller) = controller().await;
        let created = controller
            .create_one(doc! { "name" => "a" }, None, &CreateHooks::default())
            .await
            .unwrap();
        let hooks = UpdateHooks::new().before_update(|_, _, session| {
            Box::pin(async move {
                assert!(session.is_some());
                Ok(())
            })
        });
        let updated = controller
            .update_one_by_id_and_version(
                created.get("_id").cloned(),
                Some(Value::from("0")),
                doc! { "rank" => "7" },
                None,
                &hooks,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.get("rank"), Some(&Value::Int32(7)));
        assert_eq!(store.active_sessions(), 0);
    }
}
