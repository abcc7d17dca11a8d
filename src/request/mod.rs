//! Request schema validation
//!
//! Each inbound request carries four independent regions: headers, path
//! parameters, query string and body. A [`RequestSchema`] gives every region
//! a presence policy and a shape; [`RequestSchema::parse`] checks presence,
//! then validates and coerces the sent regions before any service runs.

mod notation;

pub use notation::{parse_shape, OPTIONAL_PREFIX};

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value as Json;
use tracing::debug;

use crate::coerce::coerce_primitive;
use crate::error::{EngineError, EngineResult};
use crate::schema::{Definition, Kind};
use crate::value::{Document, Value};

/// The four request regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Headers,
    PathParameters,
    QueryString,
    Body,
}

impl Region {
    fn missing(&self) -> EngineError {
        let (code, message) = match self {
            Region::Headers => ("HEADERS_MISSING", "Headers are required but missing."),
            Region::PathParameters => (
                "PATH_PARAMETERS_MISSING",
                "Path parameters are required but missing.",
            ),
            Region::QueryString => (
                "QUERY_STRING_MISSING",
                "Query string parameters are required but missing.",
            ),
            Region::Body => ("BODY_MISSING", "Request body is required but missing."),
        };
        EngineError::bad_request(code, message)
    }

    fn forbidden(&self) -> EngineError {
        let (code, message) = match self {
            Region::Headers => ("HEADERS_FORBIDDEN", "Headers are forbidden but sent."),
            Region::PathParameters => (
                "PATH_PARAMETERS_FORBIDDEN",
                "Path parameters are forbidden but sent.",
            ),
            Region::QueryString => (
                "QUERY_STRING_FORBIDDEN",
                "Query string parameters are forbidden but sent.",
            ),
            Region::Body => ("BODY_FORBIDDEN", "Request body is forbidden but sent."),
        };
        EngineError::forbidden(code, message)
    }
}

/// Presence policy of a region
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Presence {
    /// Must be sent and valid
    #[serde(rename = "allowed-required")]
    Required,
    /// Validated only when sent
    #[default]
    #[serde(rename = "allowed-optional")]
    Optional,
    /// Must not be sent
    #[serde(rename = "forbidden")]
    Forbidden,
}

/// Policy and shape of one region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionSchema {
    pub presence: Presence,
    /// Ignored for forbidden regions
    pub definition: Option<Definition>,
}

impl RegionSchema {
    pub fn required(definition: Definition) -> Self {
        Self {
            presence: Presence::Required,
            definition: Some(definition),
        }
    }

    pub fn optional(definition: Definition) -> Self {
        Self {
            presence: Presence::Optional,
            definition: Some(definition),
        }
    }

    pub fn forbidden() -> Self {
        Self {
            presence: Presence::Forbidden,
            definition: None,
        }
    }
}

#[derive(Deserialize)]
struct RegionSchemaJson {
    #[serde(default)]
    presence: Presence,
    #[serde(default)]
    definition: Option<Json>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestSchemaJson {
    #[serde(default)]
    headers: Option<RegionSchemaJson>,
    #[serde(default)]
    path_parameters: Option<RegionSchemaJson>,
    #[serde(default)]
    query_string: Option<RegionSchemaJson>,
    #[serde(default)]
    body: Option<RegionSchemaJson>,
}

/// Schemas for all four regions of a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestSchema {
    pub headers: RegionSchema,
    pub path_parameters: RegionSchema,
    pub query_string: RegionSchema,
    pub body: RegionSchema,
}

/// The regions of a request as the transport delivered them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRequest {
    pub headers: Option<Value>,
    pub path_parameters: Option<Value>,
    pub query_string: Option<Value>,
    pub body: Option<Value>,
}

/// Validated and coerced regions. A region that was not validated is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRequest {
    pub headers: Option<Value>,
    pub path_parameters: Option<Value>,
    pub query_string: Option<Value>,
    pub body: Option<Value>,
}

impl RawRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(mut self, headers: impl Into<Value>) -> Self {
        self.headers = Some(headers.into());
        self
    }

    pub fn with_path_parameters(mut self, parameters: impl Into<Value>) -> Self {
        self.path_parameters = Some(parameters.into());
        self
    }

    pub fn with_query_string(mut self, query: impl Into<Value>) -> Self {
        self.query_string = Some(query.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Builds a request from string maps, as routers deliver path and query
    /// parameters.
    pub fn from_parts(
        headers: HashMap<String, String>,
        path_parameters: HashMap<String, String>,
        query_string: HashMap<String, String>,
        body: Option<Json>,
    ) -> Self {
        fn to_document(map: HashMap<String, String>) -> Value {
            Value::Document(map.into_iter().collect::<Document>())
        }
        Self {
            headers: Some(to_document(headers)),
            path_parameters: Some(to_document(path_parameters)),
            query_string: Some(to_document(query_string)),
            body: body.map(Value::from),
        }
    }
}

impl ParsedRequest {
    /// A body property, if the body was validated and holds one.
    pub fn body_property(&self, name: &str) -> Option<&Value> {
        self.body.as_ref()?.as_document()?.get(name)
    }
}

impl RequestSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(mut self, schema: RegionSchema) -> Self {
        self.headers = schema;
        self
    }

    pub fn with_path_parameters(mut self, schema: RegionSchema) -> Self {
        self.path_parameters = schema;
        self
    }

    pub fn with_query_string(mut self, schema: RegionSchema) -> Self {
        self.query_string = schema;
        self
    }

    pub fn with_body(mut self, schema: RegionSchema) -> Self {
        self.body = schema;
        self
    }

    /// Reads a schema written as
    /// `{"body": {"presence": "allowed-required", "definition": {...}}, ...}`
    /// with definitions in compact notation. Regions left out are optional
    /// and unchecked.
    pub fn from_json(json: &Json) -> EngineResult<Self> {
        let raw: RequestSchemaJson = serde_json::from_value(json.clone())
            .map_err(|e| EngineError::invalid_argument(format!("invalid request schema: {}", e)))?;

        fn region(raw: Option<RegionSchemaJson>) -> EngineResult<RegionSchema> {
            let Some(raw) = raw else {
                return Ok(RegionSchema::default());
            };
            let definition = match raw.definition {
                Some(notation) => Some(parse_shape(&notation)?),
                None => None,
            };
            if raw.presence == Presence::Required && definition.is_none() {
                return Err(EngineError::invalid_argument(
                    "a required region needs a definition",
                ));
            }
            Ok(RegionSchema {
                presence: raw.presence,
                definition,
            })
        }

        Ok(Self {
            headers: region(raw.headers)?,
            path_parameters: region(raw.path_parameters)?,
            query_string: region(raw.query_string)?,
            body: region(raw.body)?,
        })
    }

    /// Validates every region of `request`.
    pub fn parse(&self, request: RawRequest) -> EngineResult<ParsedRequest> {
        Ok(ParsedRequest {
            headers: parse_region(Region::Headers, request.headers, &self.headers)?,
            path_parameters: parse_region(
                Region::PathParameters,
                request.path_parameters,
                &self.path_parameters,
            )?,
            query_string: parse_region(Region::QueryString, request.query_string, &self.query_string)?,
            body: parse_region(Region::Body, request.body, &self.body)?,
        })
    }
}

fn parse_region(
    region: Region,
    value: Option<Value>,
    schema: &RegionSchema,
) -> EngineResult<Option<Value>> {
    let sent = value.as_ref().is_some_and(Value::is_initialized);
    match schema.presence {
        Presence::Forbidden if sent => {
            debug!(target: "aerodoc::request", ?region, "Forbidden region sent");
            Err(region.forbidden())
        }
        Presence::Forbidden => Ok(None),
        Presence::Required => {
            let (Some(value), true) = (value, sent) else {
                debug!(target: "aerodoc::request", ?region, "Required region missing");
                return Err(region.missing());
            };
            let definition = schema.definition.as_ref().ok_or_else(|| {
                EngineError::invalid_argument(format!("{:?} is required but has no definition", region))
            })?;
            parse_value(value, definition, "").map(Some)
        }
        Presence::Optional => match (value, &schema.definition) {
            (Some(value), Some(definition)) if sent => parse_value(value, definition, "").map(Some),
            _ => Ok(None),
        },
    }
}

/// Validates one value against a request shape.
fn parse_value(value: Value, definition: &Definition, path: &str) -> EngineResult<Value> {
    match &definition.kind {
        Kind::Any => Ok(value),
        Kind::Null => match value {
            Value::Null => Ok(Value::Null),
            Value::String(s) if s == "null" => Ok(Value::Null),
            other => Err(invalid(path, &format!("expected null, got {}", other.type_name()))),
        },
        Kind::Primitive(kind) => {
            if matches!(value, Value::Document(_) | Value::Array(_)) {
                return Err(invalid(path, &format!("expected {}, got {}", kind.bson_type(), value.type_name())));
            }
            coerce_primitive(*kind, value).map_err(|reason| invalid(path, &reason))
        }
        Kind::Object(shape) => {
            let Value::Document(input) = value else {
                return Err(invalid(path, &format!("expected object, got {}", value.type_name())));
            };
            let mut pending: Vec<&str> = shape.properties.keys().map(String::as_str).collect();
            let mut out = Document::new();
            for (name, child) in input {
                let child_path = join(path, &name);
                let optional_name = format!("{}{}", OPTIONAL_PREFIX, name);
                let Some(index) = pending
                    .iter()
                    .position(|declared| *declared == name)
                    .or_else(|| pending.iter().position(|declared| *declared == optional_name))
                else {
                    debug!(target: "aerodoc::request", property = %child_path, "Undeclared property");
                    return Err(EngineError::forbidden(
                        "PROPERTY_FORBIDDEN",
                        format!("The property {} is not allowed.", child_path),
                    ));
                };
                let declared = pending.remove(index);
                let optional = declared.starts_with(OPTIONAL_PREFIX);
                let parsed = match (optional, child) {
                    (true, Value::Null) => Value::Null,
                    (_, child) => {
                        let child_def = shape.properties.get(declared).ok_or_else(|| {
                            EngineError::invalid_argument(format!("no definition for {}", declared))
                        })?;
                        parse_value(child, child_def, &child_path)?
                    }
                };
                out.insert(name, parsed);
            }
            if let Some(missing) = pending.iter().find(|declared| !declared.starts_with(OPTIONAL_PREFIX)) {
                return Err(EngineError::bad_request(
                    "INVALID_REQUEST",
                    format!("The required parameter {} was not sent.", join(path, missing)),
                ));
            }
            Ok(Value::Document(out))
        }
        Kind::Array(element) => {
            let Value::Array(items) = value else {
                return Err(invalid(path, &format!("expected array, got {}", value.type_name())));
            };
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| parse_value(item, element, &join(path, &i.to_string())))
                .collect::<EngineResult<Vec<_>>>()
                .map(Value::Array)
        }
    }
}

fn invalid(path: &str, reason: &str) -> EngineError {
    let at = if path.is_empty() { "the request" } else { path };
    EngineError::invalid_input(format!("Invalid value for {}: {}.", at, reason))
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::value::ObjectId;
    use serde_json::json;

    fn update_schema() -> RequestSchema {
        RequestSchema::from_json(&json!({
            "headers": {"presence": "allowed-optional", "definition": {".authorization": "String"}},
            "pathParameters": {"presence": "forbidden"},
            "queryString": {"presence": "forbidden"},
            "body": {
                "presence": "allowed-required",
                "definition": {
                    "_id": "ObjectId",
                    "version": "Int",
                    "documentData": {"name": "String", ".nickname": "String", ".tags": ["String"]}
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_request_is_coerced() {
        let id = ObjectId::new();
        let request = RawRequest::new().with_body(Value::from(json!({
            "_id": id.to_hex(),
            "version": "3",
            "documentData": {"name": 5, "nickname": null, "tags": ["a", 1]}
        })));
        let parsed = update_schema().parse(request).unwrap();
        assert_eq!(parsed.body_property("_id"), Some(&Value::ObjectId(id)));
        assert_eq!(parsed.body_property("version"), Some(&Value::Int32(3)));
        assert_eq!(
            parsed.body_property("documentData"),
            Some(&Value::from(doc! {
                "name" => "5",
                "nickname" => Value::Null,
                "tags" => vec![Value::from("a"), Value::from("1")],
            }))
        );
        assert!(parsed.headers.is_none());
    }

    #[test]
    fn test_missing_and_forbidden_regions() {
        let err = update_schema().parse(RawRequest::new()).unwrap_err();
        assert_eq!(err.code(), "BODY_MISSING");

        let err = update_schema()
            .parse(RawRequest::new().with_body(doc! {}))
            .unwrap_err();
        assert_eq!(err.code(), "BODY_MISSING");

        let err = update_schema()
            .parse(
                RawRequest::new()
                    .with_query_string(doc! { "x" => "1" })
                    .with_body(doc! { "a" => 1 }),
            )
            .unwrap_err();
        assert_eq!(err.code(), "QUERY_STRING_FORBIDDEN");
        assert!(matches!(err, EngineError::Forbidden { .. }));

        // empty regions count as not sent
        assert!(update_schema()
            .parse(
                RawRequest::new()
                    .with_path_parameters(doc! {})
                    .with_body(Value::from(json!({"_id": ObjectId::new().to_hex(), "version": 0, "documentData": {"name": "a"}})))
            )
            .is_ok());
    }

    #[test]
    fn test_undeclared_property_is_forbidden() {
        let request = RawRequest::new().with_body(Value::from(json!({
            "_id": ObjectId::new().to_hex(),
            "version": 0,
            "documentData": {"name": "a"},
            "extra": true
        })));
        let err = update_schema().parse(request).unwrap_err();
        assert_eq!(err.code(), "PROPERTY_FORBIDDEN");
        assert_eq!(err.to_string(), "The property extra is not allowed.");
    }

    #[test]
    fn test_missing_required_property() {
        let request = RawRequest::new().with_body(Value::from(json!({
            "_id": ObjectId::new().to_hex(),
            "version": 0,
            "documentData": {"nickname": "x"}
        })));
        let err = update_schema().parse(request).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
        assert_eq!(err.to_string(), "The required parameter documentData.name was not sent.");
    }

    #[test]
    fn test_optional_null_skips_type_check_but_required_null_does_not() {
        let schema = RequestSchema::new().with_body(RegionSchema::required(
            parse_shape(&json!({"a": "Int", ".b": "Int"})).unwrap(),
        ));
        let ok = schema
            .parse(RawRequest::new().with_body(doc! { "a" => 1, "b" => Value::Null }))
            .unwrap();
        assert_eq!(ok.body_property("b"), Some(&Value::Null));

        assert!(schema
            .parse(RawRequest::new().with_body(doc! { "a" => Value::Null }))
            .is_err());
        assert!(schema
            .parse(RawRequest::new().with_body(doc! { "a" => 1, "b" => "x" }))
            .is_err());
    }

    #[test]
    fn test_null_shape_accepts_null_text() {
        let schema = RequestSchema::new().with_query_string(RegionSchema::optional(
            parse_shape(&json!({"cursor": null})).unwrap(),
        ));
        let parsed = schema
            .parse(RawRequest::new().with_query_string(doc! { "cursor" => "null" }))
            .unwrap();
        assert_eq!(
            parsed.query_string,
            Some(Value::from(doc! { "cursor" => Value::Null }))
        );
    }

    #[test]
    fn test_from_parts() {
        let mut query = HashMap::new();
        query.insert("page".to_string(), "2".to_string());
        let request = RawRequest::from_parts(HashMap::new(), HashMap::new(), query, None);
        let schema = RequestSchema::new()
            .with_query_string(RegionSchema::required(parse_shape(&json!({"page": "Int"})).unwrap()))
            .with_body(RegionSchema::forbidden());
        let parsed = schema.parse(request).unwrap();
        assert_eq!(parsed.query_string, Some(Value::from(doc! { "page" => 2 })));
    }

    #[test]
    fn test_schema_json_errors() {
        assert!(RequestSchema::from_json(&json!({"body": {"presence": "sometimes"}})).is_err());
        assert!(RequestSchema::from_json(&json!({"body": {"presence": "allowed-required"}})).is_err());
        assert!(RequestSchema::from_json(&json!({"body": {"presence": "allowed-optional", "definition": "Nope"}})).is_err());
    }
}
