//! Persona redaction of returned documents.

use crate::schema::{Definition, Kind};
use crate::value::{Document, Value};

/// Removes every property whose definition excludes `persona`.
///
/// Objects and array elements are walked recursively. An excluded element
/// definition empties the whole array, and an excluded root empties the
/// document. Properties the definition does not name are left alone.
pub fn redact(document: &mut Document, definition: &Definition, persona: &str) {
    if definition.personas.excludes(persona) {
        document.clear();
        return;
    }
    if let Kind::Object(shape) = &definition.kind {
        document.retain(|key, value| match shape.properties.get(key) {
            Some(child) if child.personas.excludes(persona) => false,
            Some(child) => {
                redact_value(value, child, persona);
                true
            }
            None => true,
        });
    }
}

fn redact_value(value: &mut Value, definition: &Definition, persona: &str) {
    match (&definition.kind, value) {
        (Kind::Object(_), Value::Document(doc)) => redact(doc, definition, persona),
        (Kind::Array(element), Value::Array(items)) => {
            if element.personas.excludes(persona) {
                items.clear();
            } else {
                items
                    .iter_mut()
                    .for_each(|item| redact_value(item, element, persona));
            }
        }
        _ => {}
    }
}
