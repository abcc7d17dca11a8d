//! Strict document validation against a definition.
//!
//! This is the check a store performs for a collection validator: kinds must
//! match exactly, nothing is coerced and nothing is defaulted. Coercion of
//! caller input happens elsewhere, before documents reach the store.

use super::errors::{SchemaError, SchemaResult, ValidationDetails};
use super::types::{Definition, Kind, ObjectShape, PrimitiveKind};
use crate::value::{compare_values, values_equal, Document, Value};

/// Validates a whole document against a root definition.
pub fn validate_document(definition: &Definition, document: &Document) -> SchemaResult<()> {
    match &definition.kind {
        Kind::Object(shape) => validate_object(document, shape, ""),
        Kind::Any => Ok(()),
        _ => Err(SchemaError::ValidationFailed(ValidationDetails::type_mismatch(
            "$root",
            definition.kind_name(),
            "object",
        ))),
    }
}

/// Validates an object against its shape.
fn validate_object(obj: &Document, shape: &ObjectShape, path_prefix: &str) -> SchemaResult<()> {
    if shape.additional_properties == Some(false) {
        for key in obj.keys() {
            if !shape.properties.contains_key(key) {
                return Err(SchemaError::ValidationFailed(ValidationDetails::extra_field(
                    make_path(path_prefix, key),
                )));
            }
        }
    }

    for name in &shape.required {
        if !obj.contains_key(name) {
            return Err(SchemaError::ValidationFailed(ValidationDetails::missing_field(
                make_path(path_prefix, name),
            )));
        }
    }

    for (name, definition) in &shape.properties {
        if let Some(value) = obj.get(name) {
            validate_value(value, definition, &make_path(path_prefix, name))?;
        }
    }

    Ok(())
}

/// Validates a value against a definition node.
fn validate_value(value: &Value, definition: &Definition, path: &str) -> SchemaResult<()> {
    match (&definition.kind, value) {
        (Kind::Any, _) => {}
        (Kind::Null, Value::Null) => {}
        (Kind::Primitive(kind), value) if primitive_matches(*kind, value) => {}
        (Kind::Object(shape), Value::Document(obj)) => validate_object(obj, shape, path)?,
        (Kind::Array(element), Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                validate_value(item, element, &format!("{}[{}]", path, i))?;
            }
        }
        _ => return Err(type_error(path, definition, value)),
    }

    if let Some(allowed) = &definition.enum_values {
        if !allowed.iter().any(|candidate| values_equal(candidate, value)) {
            return Err(SchemaError::ValidationFailed(ValidationDetails::new(
                path,
                "one of the enumerated values",
                value.to_string(),
            )));
        }
    }

    if let Some(minimum) = definition.minimum {
        if value.as_f64().is_some()
            && compare_values(value, &Value::Double(minimum)) == std::cmp::Ordering::Less
        {
            return Err(SchemaError::ValidationFailed(ValidationDetails::new(
                path,
                format!(">= {}", minimum),
                value.to_string(),
            )));
        }
    }

    Ok(())
}

fn primitive_matches(kind: PrimitiveKind, value: &Value) -> bool {
    matches!(
        (kind, value),
        (PrimitiveKind::Boolean, Value::Boolean(_))
            | (PrimitiveKind::Int32, Value::Int32(_))
            | (PrimitiveKind::Double, Value::Double(_))
            | (PrimitiveKind::String, Value::String(_))
            | (PrimitiveKind::Binary, Value::Binary(_))
            | (PrimitiveKind::ObjectId, Value::ObjectId(_))
            | (PrimitiveKind::Date, Value::DateTime(_))
    )
}

fn make_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

fn type_error(path: &str, definition: &Definition, value: &Value) -> SchemaError {
    SchemaError::ValidationFailed(ValidationDetails::type_mismatch(
        path,
        definition.kind_name(),
        value.type_name(),
    ))
}
