//! Controller Flow Tests
//!
//! End-to-end request handling from raw request regions to JSON responses:
//! - Requests are validated before any service runs
//! - Success bodies are `{data: {...}}`, failures `{code, message}`
//! - Error categories map to their HTTP statuses
//! - Soft-deleted documents disappear from every read

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use aerodoc::http::{Controller, ControllerHooks};
use aerodoc::request::{RawRequest, RequestSchema};
use aerodoc::schema::{Definition, SchemaRegistry};
use aerodoc::service::{ApplicationService, ControllerService, CreateHooks};
use aerodoc::store::InMemoryStore;
use aerodoc::EngineConfig;
use axum::body::to_bytes;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::{json, Value as Json};

// =============================================================================
// Helper Functions
// =============================================================================

struct Fixture {
    store: Arc<InMemoryStore>,
    controller: Controller,
}

async fn setup(config: EngineConfig, persona: Option<&str>, hooks: ControllerHooks) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let definition = Definition::object()
        .property("name", Definition::string())
        .property("age", Definition::int32())
        .property("salary", Definition::int32().excluded_from(["guest"]))
        .required(["name"]);
    let registry = SchemaRegistry::new(store.clone(), "app", "people", definition, config.schema)
        .unwrap();
    registry.synchronized().await.unwrap();

    let mut application = ApplicationService::new(Arc::new(registry), &config).unwrap();
    if let Some(persona) = persona {
        application = application.with_persona(persona);
    }
    let controller = Controller::new(ControllerService::new(application)).with_hooks(hooks);
    Fixture { store, controller }
}

fn schema(body: Json) -> RequestSchema {
    RequestSchema::from_json(&json!({
        "pathParameters": {"presence": "forbidden"},
        "queryString": {"presence": "forbidden"},
        "body": body,
    }))
    .unwrap()
}

fn read_schema() -> RequestSchema {
    schema(json!({"presence": "allowed-optional", "definition": {".query": "*", ".options": "*"}}))
}

fn read_one_schema() -> RequestSchema {
    schema(json!({"presence": "allowed-required", "definition": {"_id": "ObjectId"}}))
}

fn create_schema() -> RequestSchema {
    schema(json!({"presence": "allowed-required", "definition": {"documentData": "*"}}))
}

fn update_schema() -> RequestSchema {
    schema(json!({
        "presence": "allowed-required",
        "definition": {"_id": "ObjectId", "version": "Int", "documentData": "*"}
    }))
}

fn delete_schema() -> RequestSchema {
    schema(json!({"presence": "allowed-required", "definition": {"_id": "ObjectId", "version": "Int"}}))
}

fn body(json: Json) -> RawRequest {
    RawRequest::new().with_body(json)
}

async fn parts(response: Response) -> (StatusCode, Json) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create(fixture: &Fixture, data: Json) -> Json {
    let response = fixture
        .controller
        .create_one(body(json!({"documentData": data})), &create_schema())
        .await;
    let (status, json) = parts(response).await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);
    json["data"]["document"].clone()
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

/// Test: Create returns the stored document with its managed fields.
#[tokio::test]
async fn test_create_sets_managed_fields() {
    let fixture = setup(EngineConfig::default(), None, ControllerHooks::default()).await;
    let document = create(&fixture, json!({"name": "a"})).await;

    assert_eq!(document["name"], "a");
    assert_eq!(document["version"], 0);
    assert_eq!(document["isSoftDeleted"], false);
    assert!(document["createdAt"].is_string());
    assert_eq!(document["_id"].as_str().map(str::len), Some(24));
}

/// Test: Read returns a page plus the total number of matches.
#[tokio::test]
async fn test_read_pages_and_counts() {
    let fixture = setup(EngineConfig::default(), None, ControllerHooks::default()).await;
    for (name, age) in [("a", 30), ("b", 20), ("c", 10)] {
        create(&fixture, json!({"name": name, "age": age})).await;
    }

    let response = fixture
        .controller
        .read(
            body(json!({"query": {}, "options": {"sort": {"age": 1}, "limit": 2}})),
            &read_schema(),
        )
        .await;
    let (status, json) = parts(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["count"], 3);
    let names: Vec<_> = json["data"]["documents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["c", "b"]);
}

/// Test: Query values arriving as strings are coerced to the declared kinds.
#[tokio::test]
async fn test_read_coerces_query_values() {
    let fixture = setup(EngineConfig::default(), None, ControllerHooks::default()).await;
    create(&fixture, json!({"name": "a", "age": 30})).await;
    create(&fixture, json!({"name": "b", "age": 40})).await;

    let response = fixture
        .controller
        .read(body(json!({"query": {"age": {"$gte": "35"}}})), &read_schema())
        .await;
    let (status, json) = parts(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["count"], 1);
    assert_eq!(json["data"]["documents"][0]["name"], "b");
}

/// Test: Update, then soft delete, then the document is gone from reads.
#[tokio::test]
async fn test_update_then_soft_delete() {
    let fixture = setup(EngineConfig::default(), None, ControllerHooks::default()).await;
    let created = create(&fixture, json!({"name": "a"})).await;
    let id = created["_id"].clone();

    let response = fixture
        .controller
        .update_one_by_id_and_version(
            body(json!({"_id": id, "version": 0, "documentData": {"age": "41"}})),
            &update_schema(),
        )
        .await;
    let (status, json) = parts(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["document"]["age"], 41);
    assert_eq!(json["data"]["document"]["version"], 1);
    assert!(json["data"]["document"]["updatedAt"].is_string());

    let response = fixture
        .controller
        .soft_delete_one_by_id_and_version(body(json!({"_id": id, "version": 1})), &delete_schema())
        .await;
    let (status, json) = parts(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["document"]["isSoftDeleted"], true);
    assert_eq!(json["data"]["document"]["version"], 2);
    assert!(json["data"]["document"]["softDeletedAt"].is_string());

    let (_, json) = parts(fixture.controller.read(RawRequest::new(), &read_schema()).await).await;
    assert_eq!(json["data"]["count"], 0);
    assert_eq!(json["data"]["documents"], json!([]));

    let (status, json) = parts(
        fixture
            .controller
            .read_one_by_id(body(json!({"_id": id})), &read_one_schema())
            .await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["document"], Json::Null);

    // the record itself survives
    let stored = fixture.store.snapshot("app.people");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get("isSoftDeleted"), Some(&aerodoc::Value::Boolean(true)));
}

/// Test: Hard delete removes the record and returns it.
#[tokio::test]
async fn test_hard_delete() {
    let fixture = setup(EngineConfig::default(), None, ControllerHooks::default()).await;
    let created = create(&fixture, json!({"name": "a"})).await;

    let response = fixture
        .controller
        .delete_one_by_id_and_version(
            body(json!({"_id": created["_id"], "version": 0})),
            &delete_schema(),
        )
        .await;
    let (status, json) = parts(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["document"]["name"], "a");
    assert!(fixture.store.snapshot("app.people").is_empty());
}

// =============================================================================
// Error Mapping Tests
// =============================================================================

/// Test: An undeclared property is rejected with 403 before any service runs.
#[tokio::test]
async fn test_undeclared_property_is_forbidden() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let hooks = ControllerHooks {
        create: CreateHooks::new().before_create(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }),
        ..Default::default()
    };
    let fixture = setup(EngineConfig::default(), None, hooks).await;

    let response = fixture
        .controller
        .create_one(
            body(json!({"documentData": {"name": "a"}, "extra": true})),
            &create_schema(),
        )
        .await;
    let (status, json) = parts(response).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "PROPERTY_FORBIDDEN");
    assert_eq!(json["message"], "The property extra is not allowed.");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(fixture.store.snapshot("app.people").is_empty());
}

/// Test: Regions are checked for presence.
#[tokio::test]
async fn test_missing_and_forbidden_regions() {
    let fixture = setup(EngineConfig::default(), None, ControllerHooks::default()).await;

    let (status, json) = parts(fixture.controller.create_one(RawRequest::new(), &create_schema()).await).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["code"].as_str().unwrap().ends_with("MISSING"), "body: {}", json);

    let query = HashMap::from([("page".to_string(), "2".to_string())]);
    let request = RawRequest::from_parts(
        HashMap::new(),
        HashMap::new(),
        query,
        Some(json!({"documentData": {"name": "a"}})),
    );
    let (status, json) = parts(fixture.controller.create_one(request, &create_schema()).await).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(json["code"].as_str().unwrap().ends_with("FORBIDDEN"), "body: {}", json);
}

/// Test: A property unknown to the document definition is a client error.
#[tokio::test]
async fn test_unknown_document_property() {
    let fixture = setup(EngineConfig::default(), None, ControllerHooks::default()).await;
    let response = fixture
        .controller
        .create_one(body(json!({"documentData": {"name": "a", "nickname": "x"}})), &create_schema())
        .await;
    let (status, json) = parts(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "UNKNOWN_PROPERTY");
}

/// Test: A store validation failure renders as a generic bad request.
#[tokio::test]
async fn test_store_validation_failure() {
    let fixture = setup(EngineConfig::default(), None, ControllerHooks::default()).await;
    let response = fixture
        .controller
        .create_one(body(json!({"documentData": {"age": 3}})), &create_schema())
        .await;
    let (status, json) = parts(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(
        json["message"],
        "The request could not be processed due to invalid data. Please check your data and try again."
    );
}

/// Test: A stale version renders as 400 with both versions in the message.
#[tokio::test]
async fn test_version_conflict_response() {
    let fixture = setup(EngineConfig::default(), None, ControllerHooks::default()).await;
    let created = create(&fixture, json!({"name": "a"})).await;

    let response = fixture
        .controller
        .update_one_by_id_and_version(
            body(json!({"_id": created["_id"], "version": 2, "documentData": {"name": "b"}})),
            &update_schema(),
        )
        .await;
    let (status, json) = parts(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "DOCUMENT_INVALID_VERSION");
    assert_eq!(json["message"], "The document's latest version is 0, yours is 2.");
}

/// Test: With the existence policy on, a missing document is 404.
#[tokio::test]
async fn test_not_found_response() {
    let fixture = setup(EngineConfig::with_existence_errors(), None, ControllerHooks::default()).await;
    let id = aerodoc::ObjectId::new().to_hex();

    let response = fixture
        .controller
        .read_one_by_id(body(json!({"_id": id})), &read_one_schema())
        .await;
    let (status, json) = parts(response).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["message"], "The requested resource could not be found.");
}

/// Test: An identifier that is not an ObjectId fails request validation.
#[tokio::test]
async fn test_malformed_identifier() {
    let fixture = setup(EngineConfig::default(), None, ControllerHooks::default()).await;
    let response = fixture
        .controller
        .read_one_by_id(body(json!({"_id": "not-an-id"})), &read_one_schema())
        .await;
    let (status, _) = parts(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Persona Tests
// =============================================================================

/// Test: Fields hidden from the persona never leave the service.
#[tokio::test]
async fn test_persona_redaction() {
    let fixture = setup(EngineConfig::default(), Some("guest"), ControllerHooks::default()).await;
    let created = create(&fixture, json!({"name": "a", "salary": 100})).await;
    assert!(created.get("salary").is_none());
    assert_eq!(created["name"], "a");

    let (_, json) = parts(fixture.controller.read(RawRequest::new(), &read_schema()).await).await;
    assert!(json["data"]["documents"][0].get("salary").is_none());

    // stored in full
    let stored = fixture.store.snapshot("app.people");
    assert_eq!(stored[0].get("salary"), Some(&aerodoc::Value::Int32(100)));
}
