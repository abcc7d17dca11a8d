//! Compact JSON notation for request shapes.
//!
//! ```text
//! null                    null only
//! "Boolean" "Number" "Int" "String" "ObjectId" "Date" "Binary"
//! "*"                     anything
//! { "name": ..., ".nick": ... }   object; a leading "." marks an optional property
//! [ elem ]                array of elem
//! ```

use serde_json::Value as Json;

use crate::schema::{Definition, PrimitiveKind, SchemaError, SchemaResult};

/// Prefix marking an optional property in a request shape
pub const OPTIONAL_PREFIX: char = '.';

/// Parses a request shape written in compact notation.
pub fn parse_shape(notation: &Json) -> SchemaResult<Definition> {
    parse_at(notation, "$root")
}

fn parse_at(notation: &Json, path: &str) -> SchemaResult<Definition> {
    match notation {
        Json::Null => Ok(Definition::null()),
        Json::String(name) => match name.as_str() {
            "*" => Ok(Definition::any()),
            "Boolean" => Ok(Definition::boolean()),
            "Number" => Ok(Definition::primitive(PrimitiveKind::Double)),
            "Int" => Ok(Definition::int32()),
            "String" => Ok(Definition::string()),
            "ObjectId" => Ok(Definition::object_id()),
            "Date" => Ok(Definition::date()),
            "Binary" => Ok(Definition::binary()),
            other => Err(SchemaError::invalid_definition(
                path,
                format!("unknown data type '{}'", other),
            )),
        },
        Json::Object(properties) => {
            let mut definition = Definition::object();
            for (name, child) in properties {
                let child_path = format!("{}.{}", path, name);
                if name.trim_start_matches(OPTIONAL_PREFIX).is_empty() {
                    return Err(SchemaError::invalid_definition(child_path, "empty property name"));
                }
                definition = definition.property(name.clone(), parse_at(child, &child_path)?);
            }
            Ok(definition)
        }
        Json::Array(elements) => match elements.as_slice() {
            [element] => Ok(Definition::array(parse_at(element, &format!("{}[]", path))?)),
            _ => Err(SchemaError::invalid_definition(
                path,
                "an array shape needs exactly one element shape",
            )),
        },
        Json::Bool(_) | Json::Number(_) => Err(SchemaError::invalid_definition(
            path,
            "expected null, a type name, an object or an array",
        )),
    }
}
