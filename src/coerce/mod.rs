//! Value coercion engine
//!
//! Checks raw input against a [`Definition`] and converts it to the declared
//! kinds, recursing through objects and arrays. The same engine runs at every
//! layer; only the boundary layer refuses properties the definition does not
//! name.

mod primitives;

pub use primitives::coerce_primitive;

use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::schema::{Definition, Kind};
use crate::store::FindOptions;
use crate::value::{Document, Value};

/// The layer a coercion runs on behalf of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Db,
    Application,
    /// Facade; receives caller input directly
    Controller,
}

impl Layer {
    pub fn is_boundary(&self) -> bool {
        matches!(self, Layer::Controller)
    }
}

/// Coerces values against definitions on behalf of one layer.
#[derive(Debug, Clone, Copy)]
pub struct Coercer {
    layer: Layer,
}

impl Coercer {
    pub fn new(layer: Layer) -> Self {
        Self { layer }
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// Coerces `value` against `definition`.
    ///
    /// Absent and null values fail when `force_existence` is set and become
    /// null otherwise.
    pub fn coerce(
        &self,
        value: Option<Value>,
        definition: &Definition,
        force_existence: bool,
    ) -> EngineResult<Value> {
        self.coerce_at(value, definition, force_existence, "")
    }

    /// Coerces a document against an object definition.
    pub fn coerce_document(&self, document: Document, definition: &Definition) -> EngineResult<Document> {
        match self.coerce(Some(Value::Document(document)), definition, true)? {
            Value::Document(doc) => Ok(doc),
            other => Err(EngineError::invalid_input(format!(
                "Expected a document, got {}",
                other.type_name()
            ))),
        }
    }

    fn coerce_at(
        &self,
        value: Option<Value>,
        definition: &Definition,
        force_existence: bool,
        path: &str,
    ) -> EngineResult<Value> {
        let value = match value {
            Some(Value::Null) | None if force_existence => {
                return Err(EngineError::invalid_input(format!(
                    "The value of '{}' is required.",
                    display_path(path)
                )));
            }
            Some(Value::Null) | None => return Ok(Value::Null),
            Some(value) => value,
        };

        match &definition.kind {
            Kind::Any => Ok(value),
            Kind::Null => Err(invalid(path, "expected null", &value)),
            Kind::Primitive(kind) => coerce_primitive(*kind, value)
                .map_err(|reason| EngineError::invalid_input(format!(
                    "Invalid value for '{}': {}.",
                    display_path(path),
                    reason
                ))),
            Kind::Object(shape) => {
                let Value::Document(input) = value else {
                    return Err(invalid(path, "expected object", &value));
                };
                let mut out = Document::new();
                for (key, child) in input {
                    let child_path = join(path, &key);
                    match shape.properties.get(&key) {
                        Some(child_def) => {
                            let coerced = self.coerce_at(Some(child), child_def, false, &child_path)?;
                            out.insert(key, coerced);
                        }
                        None if self.layer.is_boundary() => {
                            return Err(EngineError::bad_request(
                                "UNKNOWN_PROPERTY",
                                format!("The property '{}' is not allowed.", child_path),
                            ));
                        }
                        None => {
                            debug!(target: "aerodoc::service", property = %child_path, "Dropping undeclared property");
                        }
                    }
                }
                Ok(Value::Document(out))
            }
            Kind::Array(element) => {
                let Value::Array(items) = value else {
                    return Err(invalid(path, "expected array", &value));
                };
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| self.coerce_at(Some(item), element, false, &join(path, &i.to_string())))
                    .collect::<EngineResult<Vec<_>>>()
                    .map(Value::Array)
            }
        }
    }

    /// Coerces a query filter.
    ///
    /// Keys may be dotted paths into nested definitions. Operator expressions
    /// such as `{age: {$gt: "5"}}` have their operands coerced against the
    /// field's definition, and `$and`/`$or`/`$nor` recurse.
    pub fn coerce_filter(&self, filter: Document, definition: &Definition) -> EngineResult<Document> {
        let mut out = Document::new();
        for (key, value) in filter {
            match key.as_str() {
                "$and" | "$or" | "$nor" => {
                    let Value::Array(items) = value else {
                        return Err(EngineError::invalid_input(format!("{} expects an array.", key)));
                    };
                    let mut coerced = Vec::with_capacity(items.len());
                    for item in items {
                        let Value::Document(sub) = item else {
                            return Err(EngineError::invalid_input(format!(
                                "{} expects an array of objects.",
                                key
                            )));
                        };
                        coerced.push(Value::Document(self.coerce_filter(sub, definition)?));
                    }
                    out.insert(key, Value::Array(coerced));
                }
                k if k.starts_with('$') => {
                    return Err(EngineError::invalid_input(format!(
                        "The query operator '{}' is not supported here.",
                        k
                    )));
                }
                path => match definition.resolve_path(path) {
                    Some(field_def) => {
                        let coerced = self.coerce_condition(value, field_def, path)?;
                        out.insert(key, coerced);
                    }
                    None if self.layer.is_boundary() => {
                        return Err(EngineError::bad_request(
                            "UNKNOWN_PROPERTY",
                            format!("The property '{}' is not allowed.", path),
                        ));
                    }
                    None => {
                        debug!(target: "aerodoc::service", property = %path, "Dropping undeclared query key");
                    }
                },
            }
        }
        Ok(out)
    }

    /// Coerces partial update data. Keys may be dotted paths; null values are
    /// kept, since they mark removals.
    pub fn coerce_update(&self, data: Document, definition: &Definition) -> EngineResult<Document> {
        let mut out = Document::new();
        for (key, value) in data {
            match definition.resolve_path(&key) {
                Some(field_def) => {
                    let coerced = self.coerce_at(Some(value), field_def, false, &key)?;
                    out.insert(key, coerced);
                }
                None if self.layer.is_boundary() => {
                    return Err(EngineError::bad_request(
                        "UNKNOWN_PROPERTY",
                        format!("The property '{}' is not allowed.", key),
                    ));
                }
                None => {
                    debug!(target: "aerodoc::service", property = %key, "Dropping undeclared update key");
                }
            }
        }
        Ok(out)
    }

    /// Coerces the `sort` of find options: keys must name known fields and
    /// directions must be 1 or -1.
    pub fn coerce_find_options(&self, options: FindOptions, definition: &Definition) -> EngineResult<FindOptions> {
        let Some(sort) = options.sort.clone() else {
            return Ok(options);
        };
        Ok(FindOptions {
            sort: Some(self.coerce_sort(sort, definition, "")?),
            ..options
        })
    }

    fn coerce_sort(&self, sort: Document, definition: &Definition, prefix: &str) -> EngineResult<Document> {
        let mut out = Document::new();
        for (key, direction) in sort {
            let path = join(prefix, &key);
            if definition.resolve_path(&path).is_none() && self.layer.is_boundary() {
                return Err(EngineError::bad_request(
                    "UNKNOWN_PROPERTY",
                    format!("Cannot sort by unknown property '{}'.", path),
                ));
            }
            let coerced = match direction {
                Value::Document(nested) => Value::Document(self.coerce_sort(nested, definition, &path)?),
                other => match coerce_primitive(crate::schema::PrimitiveKind::Int32, other)
                    .ok()
                    .and_then(|v| v.as_i64())
                {
                    Some(1) => Value::Int32(1),
                    Some(-1) => Value::Int32(-1),
                    _ => {
                        return Err(EngineError::invalid_input(format!(
                            "Sort direction for '{}' must be 1 or -1.",
                            path
                        )))
                    }
                },
            };
            out.insert(key, coerced);
        }
        Ok(out)
    }

    fn coerce_condition(&self, value: Value, definition: &Definition, path: &str) -> EngineResult<Value> {
        let is_operator_expression = matches!(
            &value,
            Value::Document(doc) if !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'))
        );
        if !is_operator_expression {
            let operand = operand_definition(definition, &value);
            return self.coerce_at(Some(value), operand, false, path);
        }

        let Value::Document(operators) = value else {
            return Ok(Value::Null);
        };
        let mut out = Document::new();
        for (op, operand) in operators {
            let coerced = match op.as_str() {
                "$in" | "$nin" | "$all" => {
                    let Value::Array(items) = operand else {
                        return Err(EngineError::invalid_input(format!("{} expects an array.", op)));
                    };
                    let element = element_definition(definition);
                    items
                        .into_iter()
                        .map(|item| self.coerce_at(Some(item), element, false, path))
                        .collect::<EngineResult<Vec<_>>>()
                        .map(Value::Array)?
                }
                "$exists" => coerce_primitive(crate::schema::PrimitiveKind::Boolean, operand)
                    .map_err(|reason| EngineError::invalid_input(format!("$exists on '{}': {}.", path, reason)))?,
                "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
                    self.coerce_at(Some(operand.clone()), operand_definition(definition, &operand), false, path)?
                }
                _ => operand,
            };
            out.insert(op, coerced);
        }
        Ok(Value::Document(out))
    }
}

/// Scalars compared against an array field are compared with its elements.
fn operand_definition<'d>(definition: &'d Definition, operand: &Value) -> &'d Definition {
    match (&definition.kind, operand) {
        (Kind::Array(_), Value::Array(_)) => definition,
        (Kind::Array(element), _) => element,
        _ => definition,
    }
}

fn element_definition(definition: &Definition) -> &Definition {
    match &definition.kind {
        Kind::Array(element) => element,
        _ => definition,
    }
}

fn invalid(path: &str, expectation: &str, value: &Value) -> EngineError {
    EngineError::invalid_input(format!(
        "Invalid value for '{}': {}, got {}.",
        display_path(path),
        expectation,
        value.type_name()
    ))
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "$root"
    } else {
        path
    }
}
