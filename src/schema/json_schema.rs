//! Conversion between [`Definition`] trees and `$jsonSchema` documents.
//!
//! The store only understands the standard keywords. Persona markers travel
//! under `forbiddenFromPersonas`, which the store rejects, so they must be
//! stripped before a definition is handed over as a validator.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value as Json};

use super::errors::{SchemaError, SchemaResult};
use super::types::{Definition, Kind, ObjectShape, PersonaExclusion, PrimitiveKind};
use crate::value::Value;

/// Keyword carrying persona markers.
pub const PERSONAS_KEYWORD: &str = "forbiddenFromPersonas";

/// Sigil meaning "every persona".
pub const ALL_PERSONAS: &str = "*";

impl Definition {
    /// Renders the definition as a `$jsonSchema` document.
    pub fn to_json_schema(&self, include_personas: bool) -> Json {
        let mut out = Map::new();

        match &self.kind {
            Kind::Null => {
                out.insert("bsonType".into(), json!("null"));
            }
            Kind::Primitive(kind) => {
                out.insert("bsonType".into(), json!(kind.bson_type()));
            }
            Kind::Object(shape) => {
                out.insert("bsonType".into(), json!("object"));
                let properties: Map<String, Json> = shape
                    .properties
                    .iter()
                    .map(|(name, def)| (name.clone(), def.to_json_schema(include_personas)))
                    .collect();
                out.insert("properties".into(), Json::Object(properties));
                if !shape.required.is_empty() {
                    out.insert("required".into(), json!(shape.required));
                }
                if let Some(allowed) = shape.additional_properties {
                    out.insert("additionalProperties".into(), json!(allowed));
                }
            }
            Kind::Array(element) => {
                out.insert("bsonType".into(), json!("array"));
                out.insert("items".into(), element.to_json_schema(include_personas));
            }
            Kind::Any => {}
        }

        if let Some(description) = &self.description {
            out.insert("description".into(), json!(description));
        }
        if let Some(values) = &self.enum_values {
            out.insert("enum".into(), Json::Array(values.iter().map(Value::to_json).collect()));
        }
        if let Some(minimum) = self.minimum {
            out.insert("minimum".into(), json!(minimum));
        }
        if include_personas {
            match &self.personas {
                PersonaExclusion::NotExcluded => {}
                PersonaExclusion::ExcludedFromAll => {
                    out.insert(PERSONAS_KEYWORD.into(), json!(ALL_PERSONAS));
                }
                PersonaExclusion::ExcludedFrom(personas) => {
                    out.insert(PERSONAS_KEYWORD.into(), json!(personas));
                }
            }
        }

        Json::Object(out)
    }

    /// Parses a `$jsonSchema` document.
    ///
    /// Object nodes must carry `properties` and array nodes `items`. With
    /// `allow_personas` unset, a persona marker is an unknown keyword.
    pub fn from_json_schema(schema: &Json, allow_personas: bool) -> SchemaResult<Definition> {
        parse_node(schema, "$root", allow_personas)
    }
}

fn parse_node(node: &Json, path: &str, allow_personas: bool) -> SchemaResult<Definition> {
    let obj = node
        .as_object()
        .ok_or_else(|| SchemaError::invalid_definition(path, "definition must be an object"))?;

    for key in obj.keys() {
        let known = matches!(
            key.as_str(),
            "bsonType" | "properties" | "required" | "additionalProperties" | "items"
                | "description" | "enum" | "minimum"
        ) || (allow_personas && key == PERSONAS_KEYWORD);
        if !known {
            return Err(SchemaError::invalid_definition(
                path,
                format!("unknown keyword '{}'", key),
            ));
        }
    }

    let kind = match obj.get("bsonType") {
        None => Kind::Any,
        Some(Json::String(name)) => match name.as_str() {
            "null" => Kind::Null,
            "object" => Kind::Object(parse_object(obj, path, allow_personas)?),
            "array" => {
                let items = obj.get("items").ok_or_else(|| {
                    SchemaError::invalid_definition(path, "array definition without 'items'")
                })?;
                Kind::Array(Box::new(parse_node(items, &format!("{}[]", path), allow_personas)?))
            }
            other => Kind::Primitive(PrimitiveKind::from_bson_type(other).ok_or_else(|| {
                SchemaError::invalid_definition(path, format!("unknown bsonType '{}'", other))
            })?),
        },
        Some(_) => {
            return Err(SchemaError::invalid_definition(path, "bsonType must be a string"));
        }
    };

    let mut definition = Definition::new(kind);

    if let Some(description) = obj.get("description") {
        let text = description.as_str().ok_or_else(|| {
            SchemaError::invalid_definition(path, "description must be a string")
        })?;
        definition.description = Some(text.to_string());
    }
    if let Some(values) = obj.get("enum") {
        let values = values
            .as_array()
            .ok_or_else(|| SchemaError::invalid_definition(path, "enum must be an array"))?;
        definition.enum_values = Some(values.iter().cloned().map(Value::from).collect());
    }
    if let Some(minimum) = obj.get("minimum") {
        let minimum = minimum
            .as_f64()
            .ok_or_else(|| SchemaError::invalid_definition(path, "minimum must be a number"))?;
        definition.minimum = Some(minimum);
    }
    if let Some(marker) = obj.get(PERSONAS_KEYWORD) {
        definition.personas = parse_personas(marker, path)?;
    }

    Ok(definition)
}

fn parse_object(
    obj: &Map<String, Json>,
    path: &str,
    allow_personas: bool,
) -> SchemaResult<ObjectShape> {
    let properties = obj
        .get("properties")
        .ok_or_else(|| SchemaError::invalid_definition(path, "object definition without 'properties'"))?
        .as_object()
        .ok_or_else(|| SchemaError::invalid_definition(path, "properties must be an object"))?;

    let mut parsed = BTreeMap::new();
    for (name, child) in properties {
        let child_path = if path == "$root" {
            name.clone()
        } else {
            format!("{}.{}", path, name)
        };
        parsed.insert(name.clone(), parse_node(child, &child_path, allow_personas)?);
    }

    let required = match obj.get("required") {
        None => Vec::new(),
        Some(Json::Array(names)) => names
            .iter()
            .map(|n| {
                n.as_str().map(str::to_string).ok_or_else(|| {
                    SchemaError::invalid_definition(path, "required entries must be strings")
                })
            })
            .collect::<SchemaResult<Vec<_>>>()?,
        Some(_) => return Err(SchemaError::invalid_definition(path, "required must be an array")),
    };

    let additional_properties = match obj.get("additionalProperties") {
        None => None,
        Some(Json::Bool(allowed)) => Some(*allowed),
        Some(_) => {
            return Err(SchemaError::invalid_definition(
                path,
                "additionalProperties must be a boolean",
            ))
        }
    };

    Ok(ObjectShape {
        properties: parsed,
        required,
        additional_properties,
    })
}

fn parse_personas(marker: &Json, path: &str) -> SchemaResult<PersonaExclusion> {
    match marker {
        Json::String(s) if s == ALL_PERSONAS => Ok(PersonaExclusion::ExcludedFromAll),
        Json::Array(names) => names
            .iter()
            .map(|n| {
                n.as_str().map(str::to_string).ok_or_else(|| {
                    SchemaError::invalid_definition(path, "persona names must be strings")
                })
            })
            .collect::<SchemaResult<BTreeSet<String>>>()
            .map(PersonaExclusion::ExcludedFrom),
        _ => Err(SchemaError::invalid_definition(
            path,
            format!("{} must be \"{}\" or an array of persona names", PERSONAS_KEYWORD, ALL_PERSONAS),
        )),
    }
}
