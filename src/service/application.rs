//! Business-rule service
//!
//! Enforces the managed-document rules on top of [`DbService`]: soft-deleted
//! documents are invisible, every write is gated on the stored version, the
//! existence policy decides between "not found" errors and null results, and
//! returned documents are redacted for the instance's persona.

use std::sync::Arc;

use tracing::debug;

use crate::coerce::{Coercer, Layer};
use crate::config::EngineConfig;
use crate::doc;
use crate::error::{EngineError, EngineResult};
use crate::schema::{
    Definition, SchemaRegistry, CREATED_AT_FIELD, ID_FIELD, IS_SOFT_DELETED_FIELD,
    SOFT_DELETED_AT_FIELD, UPDATED_AT_FIELD, VERSION_FIELD,
};
use crate::session::SessionCoordinator;
use crate::store::{ClientSession, CountOptions, FindOptions};
use crate::value::{Document, Value};

use super::db::DbService;
use super::hooks::{
    run_hook, CountHooks, CreateHooks, DeleteHooks, HookFlags, ReadHooks, ReadOneHooks,
    UpdateHooks,
};
use super::persona::redact;

const MANAGED_FIELDS: [&str; 6] = [
    ID_FIELD,
    VERSION_FIELD,
    IS_SOFT_DELETED_FIELD,
    CREATED_AT_FIELD,
    UPDATED_AT_FIELD,
    SOFT_DELETED_AT_FIELD,
];

/// The write a version-gated operation performs once the current document
/// has been located
enum GatedWrite {
    Update(Document),
    SoftDelete,
    Delete,
}

#[derive(Clone)]
pub struct ApplicationService {
    db: DbService,
    coercer: Coercer,
    sessions: SessionCoordinator,
    persona: Option<String>,
    raise_document_existence_errors: bool,
}

impl ApplicationService {
    /// Fails if the registry does not manage the common properties.
    pub fn new(registry: Arc<SchemaRegistry>, config: &EngineConfig) -> EngineResult<Self> {
        if !registry.config().add_common_properties {
            return Err(EngineError::invalid_argument(format!(
                "{} does not manage common properties",
                registry.namespace()
            )));
        }
        let sessions = SessionCoordinator::new(Arc::clone(registry.store()), config.transaction);
        Ok(Self {
            db: DbService::new(registry),
            coercer: Coercer::new(Layer::Application),
            sessions,
            persona: None,
            raise_document_existence_errors: config.raise_document_existence_errors,
        })
    }

    /// Redacts returned documents for `persona`.
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn persona(&self) -> Option<&str> {
        self.persona.as_deref()
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        self.db.registry()
    }

    pub fn sessions(&self) -> &SessionCoordinator {
        &self.sessions
    }

    fn definition(&self) -> &Definition {
        self.registry().definition()
    }

    // ==================
    // Reads
    // ==================

    pub async fn count(
        &self,
        query: Document,
        options: CountOptions,
        session: Option<&ClientSession>,
        hooks: &CountHooks,
    ) -> EngineResult<u64> {
        let query = self.active_query(query)?;
        let scope = self.sessions.start(session, hooks.flags.session_enabled, false)?;
        scope
            .run(|session| {
                let query = query.clone();
                let options = options.clone();
                async move { self.db.count(query, options, session.as_ref(), hooks).await }
            })
            .await
    }

    pub async fn read(
        &self,
        query: Document,
        options: FindOptions,
        session: Option<&ClientSession>,
        hooks: &ReadHooks,
    ) -> EngineResult<Vec<Document>> {
        let query = self.active_query(query)?;
        let scope = self.sessions.start(session, hooks.flags.session_enabled, false)?;
        scope
            .run(|session| {
                let query = query.clone();
                let options = options.clone();
                async move {
                    let mut documents = self.db.read(query, options, session.as_ref(), hooks).await?;
                    for document in documents.iter_mut() {
                        self.present(document, hooks.flags);
                    }
                    Ok(documents)
                }
            })
            .await
    }

    /// Reads the first match. With the existence policy active, zero or
    /// several matches are errors.
    pub async fn read_one(
        &self,
        query: Document,
        options: FindOptions,
        session: Option<&ClientSession>,
        hooks: &ReadOneHooks,
    ) -> EngineResult<Option<Document>> {
        let query = self.active_query(query)?;
        let raise = self.raises_existence_errors(hooks.flags);
        let scope = self.sessions.start(session, hooks.flags.session_enabled, false)?;
        scope
            .run(|session| {
                let query = query.clone();
                let options = options.clone();
                async move {
                    let session = session.as_ref();
                    let mut document = self.db.read_one(query.clone(), options, session, hooks).await?;
                    if raise {
                        if document.is_none() {
                            debug!(target: "aerodoc::service", namespace = %self.registry().namespace(), "No document matches");
                            return Err(EngineError::DocumentNotFound);
                        }
                        let count = self
                            .db
                            .count(query, CountOptions::default(), session, &CountHooks::default())
                            .await?;
                        if count > 1 {
                            debug!(target: "aerodoc::service", namespace = %self.registry().namespace(), count, "Ambiguous match");
                            return Err(EngineError::MultipleDocumentsFound { count: count as usize });
                        }
                    }
                    if let Some(document) = document.as_mut() {
                        self.present(document, hooks.flags);
                    }
                    Ok(document)
                }
            })
            .await
    }

    pub async fn read_one_by_id(
        &self,
        id: Value,
        session: Option<&ClientSession>,
        hooks: &ReadOneHooks,
    ) -> EngineResult<Option<Document>> {
        let id = self.coerce_id(id)?;
        self.read_one(doc! { ID_FIELD => id }, FindOptions::default(), session, hooks)
            .await
    }

    pub async fn read_one_by_id_and_version(
        &self,
        id: Value,
        version: Value,
        session: Option<&ClientSession>,
        hooks: &ReadOneHooks,
    ) -> EngineResult<Option<Document>> {
        let id = self.coerce_id(id)?;
        let version = self.coerce_version(version)?;
        self.read_one(
            doc! { ID_FIELD => id, VERSION_FIELD => version },
            FindOptions::default(),
            session,
            hooks,
        )
        .await
    }

    // ==================
    // Writes
    // ==================

    /// Stores a new document at version 0.
    pub async fn create_one(
        &self,
        data: Document,
        session: Option<&ClientSession>,
        hooks: &CreateHooks,
    ) -> EngineResult<Document> {
        let mut data = self.coercer.coerce_document(data, self.definition())?;
        if matches!(data.get(ID_FIELD), Some(Value::Null)) {
            data.remove(ID_FIELD);
        }
        for field in &MANAGED_FIELDS[1..] {
            data.remove(field);
        }
        data.insert(VERSION_FIELD, 0);
        data.insert(IS_SOFT_DELETED_FIELD, false);
        data.insert(CREATED_AT_FIELD, SchemaRegistry::now());

        let scope = self.sessions.start(session, hooks.flags.session_enabled, true)?;
        scope
            .run(|session| {
                let data = data.clone();
                async move {
                    let mut document = self.db.create_one(data, session.as_ref(), hooks).await?;
                    self.present(&mut document, hooks.flags);
                    Ok(document)
                }
            })
            .await
    }

    /// Updates the single active document matching `query`.
    pub async fn update_one(
        &self,
        query: Document,
        data: Document,
        session: Option<&ClientSession>,
        hooks: &UpdateHooks,
    ) -> EngineResult<Option<Document>> {
        let query = self.active_query(query)?;
        self.update(query, None, data, session, hooks).await
    }

    /// Updates a document if `version` is its stored version.
    pub async fn update_one_by_id_and_version(
        &self,
        id: Value,
        version: Value,
        data: Document,
        session: Option<&ClientSession>,
        hooks: &UpdateHooks,
    ) -> EngineResult<Option<Document>> {
        let query = self.id_query(id)?;
        let version = self.coerce_version(version)?;
        self.update(query, Some(version), data, session, hooks).await
    }

    pub async fn soft_delete_one(
        &self,
        query: Document,
        session: Option<&ClientSession>,
        hooks: &DeleteHooks,
    ) -> EngineResult<Option<Document>> {
        let query = self.active_query(query)?;
        self.delete(query, None, true, session, hooks).await
    }

    /// Marks a document deleted if `version` is its stored version. The
    /// record stays in the store.
    pub async fn soft_delete_one_by_id_and_version(
        &self,
        id: Value,
        version: Value,
        session: Option<&ClientSession>,
        hooks: &DeleteHooks,
    ) -> EngineResult<Option<Document>> {
        let query = self.id_query(id)?;
        let version = self.coerce_version(version)?;
        self.delete(query, Some(version), true, session, hooks).await
    }

    pub async fn delete_one(
        &self,
        query: Document,
        session: Option<&ClientSession>,
        hooks: &DeleteHooks,
    ) -> EngineResult<Option<Document>> {
        let query = self.active_query(query)?;
        self.delete(query, None, false, session, hooks).await
    }

    /// Removes a document if `version` is its stored version, returning the
    /// removed document.
    pub async fn delete_one_by_id_and_version(
        &self,
        id: Value,
        version: Value,
        session: Option<&ClientSession>,
        hooks: &DeleteHooks,
    ) -> EngineResult<Option<Document>> {
        let query = self.id_query(id)?;
        let version = self.coerce_version(version)?;
        self.delete(query, Some(version), false, session, hooks).await
    }

    async fn update(
        &self,
        query: Document,
        expected: Option<i64>,
        data: Document,
        session: Option<&ClientSession>,
        hooks: &UpdateHooks,
    ) -> EngineResult<Option<Document>> {
        let mut data = self.coercer.coerce_update(data, self.definition())?;
        for field in MANAGED_FIELDS {
            data.remove(field);
        }
        let raise = self.raises_existence_errors(hooks.flags);
        let scope = self.sessions.start(session, hooks.flags.session_enabled, true)?;
        scope
            .run(|session| {
                let mut query = query.clone();
                let mut data = data.clone();
                async move {
                    let session = session.as_ref();
                    if let Some(hook) = &hooks.before_update {
                        hook(&mut query, &mut data, session).await?;
                    }
                    let mut document = self
                        .gated_write(query, expected, GatedWrite::Update(data), session, raise)
                        .await?;
                    run_hook(&hooks.after_update, &mut document, session).await?;
                    if let Some(document) = document.as_mut() {
                        self.present(document, hooks.flags);
                    }
                    Ok(document)
                }
            })
            .await
    }

    async fn delete(
        &self,
        query: Document,
        expected: Option<i64>,
        soft: bool,
        session: Option<&ClientSession>,
        hooks: &DeleteHooks,
    ) -> EngineResult<Option<Document>> {
        let raise = self.raises_existence_errors(hooks.flags);
        let scope = self.sessions.start(session, hooks.flags.session_enabled, true)?;
        scope
            .run(|session| {
                let mut query = query.clone();
                async move {
                    let session = session.as_ref();
                    run_hook(&hooks.before_delete, &mut query, session).await?;
                    let write = if soft { GatedWrite::SoftDelete } else { GatedWrite::Delete };
                    let mut document = self.gated_write(query, expected, write, session, raise).await?;
                    run_hook(&hooks.after_delete, &mut document, session).await?;
                    if let Some(document) = document.as_mut() {
                        self.present(document, hooks.flags);
                    }
                    Ok(document)
                }
            })
            .await
    }

    /// Locates the current document, checks its version and performs `write`
    /// gated on `{_id, version, isSoftDeleted: false}`.
    ///
    /// `expected` is the caller's version for by-id writes; query-based
    /// writes take whatever version is stored but still require exactly one
    /// match.
    async fn gated_write(
        &self,
        locate: Document,
        expected: Option<i64>,
        write: GatedWrite,
        session: Option<&ClientSession>,
        raise: bool,
    ) -> EngineResult<Option<Document>> {
        let current = match expected {
            Some(_) => {
                self.db
                    .read_one(locate, FindOptions::default(), session, &ReadOneHooks::default())
                    .await?
            }
            None => {
                let mut matches = self
                    .db
                    .read(locate, FindOptions::default().with_limit(2), session, &ReadHooks::default())
                    .await?;
                match matches.len() {
                    1 => matches.pop(),
                    0 => None,
                    count if raise => {
                        debug!(target: "aerodoc::service", namespace = %self.registry().namespace(), count, "Ambiguous match for write");
                        return Err(EngineError::MultipleDocumentsFound { count });
                    }
                    _ => return Ok(None),
                }
            }
        };
        let Some(current) = current else {
            return self.missing(raise);
        };

        let id = current.get(ID_FIELD).cloned().unwrap_or(Value::Null);
        let stored = stored_version(&current)?;
        let yours = expected.unwrap_or(stored);
        if yours != stored {
            debug!(target: "aerodoc::service", namespace = %self.registry().namespace(), %id, stored, yours, "Version mismatch");
            return Err(EngineError::VersionConflict {
                latest: stored,
                yours,
            });
        }

        let gate = doc! {
            ID_FIELD => id.clone(),
            VERSION_FIELD => stored,
            IS_SOFT_DELETED_FIELD => false,
        };
        let now = SchemaRegistry::now();
        let written = match write {
            GatedWrite::Update(mut data) => {
                data.insert(VERSION_FIELD, stored + 1);
                data.insert(UPDATED_AT_FIELD, now);
                self.db
                    .update_one(gate, data, session, &UpdateHooks::default())
                    .await?
            }
            GatedWrite::SoftDelete => {
                let data = doc! {
                    VERSION_FIELD => stored + 1,
                    IS_SOFT_DELETED_FIELD => true,
                    SOFT_DELETED_AT_FIELD => now,
                };
                self.db
                    .update_one(gate, data, session, &UpdateHooks::default())
                    .await?
            }
            GatedWrite::Delete => {
                self.db
                    .delete_one(gate, session, &DeleteHooks::default())
                    .await?
            }
        };
        if written.is_some() {
            return Ok(written);
        }

        // Lost a race between the read and the gated write.
        let latest = self
            .db
            .read_one(
                doc! { ID_FIELD => id.clone(), IS_SOFT_DELETED_FIELD => false },
                FindOptions::default(),
                session,
                &ReadOneHooks::default(),
            )
            .await?;
        match latest {
            Some(latest) => {
                let latest = stored_version(&latest)?;
                debug!(target: "aerodoc::service", namespace = %self.registry().namespace(), %id, latest, yours, "Concurrent write won");
                Err(EngineError::VersionConflict { latest, yours })
            }
            None => self.missing(raise),
        }
    }

    // ==================
    // Helpers
    // ==================

    /// Coerces a caller query and hides soft-deleted documents.
    fn active_query(&self, query: Document) -> EngineResult<Document> {
        let mut query = self.coercer.coerce_filter(query, self.definition())?;
        query.insert(IS_SOFT_DELETED_FIELD, false);
        Ok(query)
    }

    fn id_query(&self, id: Value) -> EngineResult<Document> {
        let id = self.coerce_id(id)?;
        Ok(doc! { ID_FIELD => id, IS_SOFT_DELETED_FIELD => false })
    }

    fn coerce_id(&self, id: Value) -> EngineResult<Value> {
        self.coercer.coerce(Some(id), &Definition::object_id(), true)
    }

    /// Versions are stored as 32-bit integers and never go below zero.
    fn coerce_version(&self, version: Value) -> EngineResult<i64> {
        let version = self
            .coercer
            .coerce(Some(version), &Definition::int32(), true)?
            .as_i64()
            .ok_or_else(|| EngineError::invalid_input("The version must be an integer."))?;
        if version < 0 {
            return Err(EngineError::invalid_input("The version must not be negative."));
        }
        Ok(version)
    }

    fn raises_existence_errors(&self, flags: HookFlags) -> bool {
        flags
            .raise_document_existence_errors
            .unwrap_or(self.raise_document_existence_errors)
    }

    fn missing<T>(&self, raise: bool) -> EngineResult<Option<T>> {
        if raise {
            debug!(target: "aerodoc::service", namespace = %self.registry().namespace(), "Document not found");
            Err(EngineError::DocumentNotFound)
        } else {
            Ok(None)
        }
    }

    fn present(&self, document: &mut Document, flags: HookFlags) {
        if flags.keep_forbidden_fields {
            return;
        }
        if let Some(persona) = &self.persona {
            redact(document, self.definition(), persona);
        }
    }
}

fn stored_version(document: &Document) -> EngineResult<i64> {
    document
        .get(VERSION_FIELD)
        .and_then(Value::as_i64)
        .ok_or_else(|| EngineError::invalid_argument("stored document has no numeric version"))
}
