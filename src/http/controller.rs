//! Request handlers over a [`ControllerService`].
//!
//! Every handler validates the request against its schema, reads its
//! arguments from the parsed body, calls the facade and renders
//! `{data: {...}}` with status 200. Failures render as `{code, message}`.

use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::{EngineError, EngineResult};
use crate::request::{ParsedRequest, RawRequest, RequestSchema};
use crate::service::{
    ControllerService, CountHooks, CreateHooks, DeleteHooks, ReadHooks, ReadOneHooks, UpdateHooks,
};
use crate::store::FindOptions;
use crate::value::{Document, Value};

use super::response::{HttpError, SuccessEnvelope};

/// Hooks handed to the facade by each handler
#[derive(Clone, Default)]
pub struct ControllerHooks {
    pub read: ReadHooks,
    pub count: CountHooks,
    pub read_one: ReadOneHooks,
    pub create: CreateHooks,
    pub update: UpdateHooks,
    pub soft_delete: DeleteHooks,
    pub delete: DeleteHooks,
}

#[derive(Clone)]
pub struct Controller {
    service: ControllerService,
    hooks: ControllerHooks,
}

impl Controller {
    pub fn new(service: ControllerService) -> Self {
        Self {
            service,
            hooks: ControllerHooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: ControllerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn service(&self) -> &ControllerService {
        &self.service
    }

    /// Body `{query, options}`; responds `{documents, count}`.
    pub async fn read(&self, request: RawRequest, schema: &RequestSchema) -> Response {
        respond(self.try_read(request, schema).await)
    }

    /// Body `{_id}`; responds `{document}`.
    pub async fn read_one_by_id(&self, request: RawRequest, schema: &RequestSchema) -> Response {
        respond(self.try_read_one_by_id(request, schema).await)
    }

    /// Body `{documentData}`; responds `{document}`.
    pub async fn create_one(&self, request: RawRequest, schema: &RequestSchema) -> Response {
        respond(self.try_create_one(request, schema).await)
    }

    /// Body `{_id, version, documentData}`; responds `{document}`.
    pub async fn update_one_by_id_and_version(
        &self,
        request: RawRequest,
        schema: &RequestSchema,
    ) -> Response {
        respond(self.try_update(request, schema).await)
    }

    /// Body `{_id, version}`; responds `{document}`.
    pub async fn soft_delete_one_by_id_and_version(
        &self,
        request: RawRequest,
        schema: &RequestSchema,
    ) -> Response {
        respond(self.try_delete(request, schema, true).await)
    }

    /// Body `{_id, version}`; responds `{document}`.
    pub async fn delete_one_by_id_and_version(
        &self,
        request: RawRequest,
        schema: &RequestSchema,
    ) -> Response {
        respond(self.try_delete(request, schema, false).await)
    }

    async fn try_read(&self, request: RawRequest, schema: &RequestSchema) -> EngineResult<SuccessEnvelope> {
        let parsed = schema.parse(request)?;
        let query = document_argument(&parsed, "query")?.unwrap_or_default();
        let options = match parsed.body_property("options") {
            None | Some(Value::Null) => FindOptions::default(),
            Some(options) => serde_json::from_value(options.to_json())
                .map_err(|e| EngineError::invalid_input(format!("Invalid options: {}", e)))?,
        };
        let result = self
            .service
            .read(query, options, None, &self.hooks.read, &self.hooks.count)
            .await?;
        render(json!({
            "documents": result.documents,
            "count": result.count,
        }))
    }

    async fn try_read_one_by_id(
        &self,
        request: RawRequest,
        schema: &RequestSchema,
    ) -> EngineResult<SuccessEnvelope> {
        let parsed = schema.parse(request)?;
        let id = parsed.body_property("_id").cloned();
        let document = self
            .service
            .read_one_by_id(id, None, &self.hooks.read_one)
            .await?;
        render(json!({ "document": document }))
    }

    async fn try_create_one(
        &self,
        request: RawRequest,
        schema: &RequestSchema,
    ) -> EngineResult<SuccessEnvelope> {
        let parsed = schema.parse(request)?;
        let data = document_argument(&parsed, "documentData")?
            .ok_or_else(|| EngineError::invalid_input("The document data is required."))?;
        let document = self
            .service
            .create_one(data, None, &self.hooks.create)
            .await?;
        render(json!({ "document": document }))
    }

    async fn try_update(&self, request: RawRequest, schema: &RequestSchema) -> EngineResult<SuccessEnvelope> {
        let parsed = schema.parse(request)?;
        let id = parsed.body_property("_id").cloned();
        let version = parsed.body_property("version").cloned();
        let data = document_argument(&parsed, "documentData")?
            .ok_or_else(|| EngineError::invalid_input("The document data is required."))?;
        let document = self
            .service
            .update_one_by_id_and_version(id, version, data, None, &self.hooks.update)
            .await?;
        render(json!({ "document": document }))
    }

    async fn try_delete(
        &self,
        request: RawRequest,
        schema: &RequestSchema,
        soft: bool,
    ) -> EngineResult<SuccessEnvelope> {
        let parsed = schema.parse(request)?;
        let id = parsed.body_property("_id").cloned();
        let version = parsed.body_property("version").cloned();
        let document = if soft {
            self.service
                .soft_delete_one_by_id_and_version(id, version, None, &self.hooks.soft_delete)
                .await?
        } else {
            self.service
                .delete_one_by_id_and_version(id, version, None, &self.hooks.delete)
                .await?
        };
        render(json!({ "document": document }))
    }
}

/// A body property that must be an object when present.
fn document_argument(parsed: &ParsedRequest, name: &str) -> EngineResult<Option<Document>> {
    match parsed.body_property(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Document(doc)) => Ok(Some(doc.clone())),
        Some(other) => Err(EngineError::invalid_input(format!(
            "{} must be an object, got {}.",
            name,
            other.type_name()
        ))),
    }
}

fn render(data: serde_json::Value) -> EngineResult<SuccessEnvelope> {
    Ok(SuccessEnvelope::ok().with_data(data))
}

fn respond(result: EngineResult<SuccessEnvelope>) -> Response {
    match result {
        Ok(envelope) => envelope.into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}
