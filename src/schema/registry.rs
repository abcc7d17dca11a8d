//! Schema registry: binds a logical collection to its physical namespace
//! and a definition, and keeps the store's validator in step with it.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::errors::SchemaError;
use super::types::{Definition, Kind};
use super::{
    CREATED_AT_FIELD, ID_FIELD, IS_SOFT_DELETED_FIELD, SOFT_DELETED_AT_FIELD, UPDATED_AT_FIELD,
    VERSION_FIELD,
};
use crate::config::SchemaConfig;
use crate::error::{EngineError, EngineResult};
use crate::store::{
    codes, CollectionOptions, DocumentStore, IndexModel, SortDirection, StoreError,
    ValidationLevel,
};

enum SyncState {
    Pending(JoinHandle<EngineResult<()>>),
    Done(EngineResult<()>),
}

/// A collection's shape and physical binding.
///
/// Construction returns immediately; the collection and its validator are
/// created or updated in a background task. Use [`SchemaRegistry::synchronized`]
/// to wait for that task.
pub struct SchemaRegistry {
    database: String,
    collection: String,
    namespace: String,
    definition: Definition,
    config: SchemaConfig,
    store: Arc<dyn DocumentStore>,
    sync: Mutex<SyncState>,
}

impl SchemaRegistry {
    /// Registers `definition` for `database.collection`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        database: impl Into<String>,
        collection: impl Into<String>,
        mut definition: Definition,
        config: SchemaConfig,
    ) -> EngineResult<Self> {
        let database = database.into();
        let collection = collection.into();
        let namespace = format!("{}.{}", database, collection);

        if config.add_common_properties {
            add_common_properties(&mut definition)?;
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            EngineError::invalid_argument("SchemaRegistry::new must run inside a tokio runtime")
        })?;
        let task = runtime.spawn(reconcile(
            Arc::clone(&store),
            namespace.clone(),
            definition.clone(),
            config,
        ));

        Ok(Self {
            database,
            collection,
            namespace,
            definition,
            config,
            store,
            sync: Mutex::new(SyncState::Pending(task)),
        })
    }

    /// Parses a `$jsonSchema`-style definition (persona markers allowed) and
    /// registers it.
    pub fn from_json_schema(
        store: Arc<dyn DocumentStore>,
        database: impl Into<String>,
        collection: impl Into<String>,
        schema: &serde_json::Value,
        config: SchemaConfig,
    ) -> EngineResult<Self> {
        let definition = Definition::from_json_schema(schema, true)?;
        Self::new(store, database, collection, definition, config)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Logical collection name
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Physical store namespace, `database.collection`
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The definition, including any added common properties.
    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    pub fn config(&self) -> SchemaConfig {
        self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Waits for the background reconciliation and returns its outcome.
    pub async fn synchronized(&self) -> EngineResult<()> {
        let mut state = self.sync.lock().await;
        if let SyncState::Pending(task) = &mut *state {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(SchemaError::SyncFailed {
                    collection: self.namespace.clone(),
                    message: e.to_string(),
                }
                .into()),
            };
            *state = SyncState::Done(outcome);
        }
        match &*state {
            SyncState::Done(outcome) => outcome.clone(),
            SyncState::Pending(_) => Ok(()),
        }
    }

    /// Current time, truncated to the millisecond precision the store keeps.
    pub fn now() -> chrono::DateTime<Utc> {
        let now = Utc::now();
        chrono::DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
    }
}

/// Adds the managed fields to a root object definition.
fn add_common_properties(definition: &mut Definition) -> EngineResult<()> {
    let Kind::Object(shape) = &mut definition.kind else {
        return Err(SchemaError::invalid_definition(
            "$root",
            "common properties need an object root definition",
        )
        .into());
    };

    let managed = [
        (ID_FIELD, Definition::object_id(), true),
        (VERSION_FIELD, Definition::int32(), true),
        (IS_SOFT_DELETED_FIELD, Definition::boolean().excluded_from_all(), true),
        (CREATED_AT_FIELD, Definition::date().excluded_from_all(), true),
        (UPDATED_AT_FIELD, Definition::date().excluded_from_all(), false),
        (SOFT_DELETED_AT_FIELD, Definition::date().excluded_from_all(), false),
    ];
    for (name, field, required) in managed {
        shape.properties.insert(name.to_string(), field);
        if required && !shape.required.iter().any(|r| r == name) {
            shape.required.push(name.to_string());
        }
    }
    Ok(())
}

/// Creates the collection with its validator, or updates the validator of an
/// existing one, then ensures the soft-delete index.
async fn reconcile(
    store: Arc<dyn DocumentStore>,
    namespace: String,
    definition: Definition,
    config: SchemaConfig,
) -> EngineResult<()> {
    let options = if config.validation_enabled {
        CollectionOptions {
            validator: json!({ "$jsonSchema": definition.to_json_schema(false) }),
            validation_level: ValidationLevel::Moderate,
        }
    } else {
        CollectionOptions {
            validator: json!({}),
            validation_level: ValidationLevel::Off,
        }
    };

    let outcome = async {
        match store.create_collection(&namespace, options.clone()).await {
            Ok(()) => {
                info!(target: "aerodoc::schema", collection = %namespace, "Collection created");
            }
            Err(e) if e.code == codes::NAMESPACE_EXISTS => {
                store
                    .modify_collection(&namespace, options)
                    .await
                    .map_err(|e| classify(&namespace, e))?;
                info!(target: "aerodoc::schema", collection = %namespace, "Collection validator updated");
            }
            Err(e) => return Err(classify(&namespace, e)),
        }

        if config.add_common_properties {
            let index = IndexModel::new(vec![(
                IS_SOFT_DELETED_FIELD.to_string(),
                SortDirection::Descending,
            )]);
            store.create_index(&namespace, index).await?;
        }
        Ok::<(), EngineError>(())
    }
    .await;

    if let Err(e) = &outcome {
        error!(target: "aerodoc::schema", collection = %namespace, code = e.code(), error = %e, "Collection synchronization failed");
    }
    outcome
}

fn classify(namespace: &str, e: StoreError) -> EngineError {
    if e.code == codes::FAILED_TO_PARSE {
        SchemaError::UnparsableValidator {
            collection: namespace.to_string(),
            message: e.message,
        }
        .into()
    } else {
        e.into()
    }
}
