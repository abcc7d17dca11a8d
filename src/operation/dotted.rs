//! Dot-flattening of nested documents into store-native dotted paths.

use crate::store::UpdateOperation;
use crate::value::{Document, Value};

/// Which store primitive a flattened document is destined for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlattenMode {
    /// Filters and sort specifications
    Read,
    /// `$set`/`$unset` payloads
    Update,
}

/// Flattens nested documents into dotted keys.
///
/// Empty documents and empty arrays are leaves. In read mode a non-empty
/// array expands into one `path.N` key per element; in update mode every
/// array is a leaf. In read mode the operator keys of a nested document (`{age: {$gt: 1, $lt: 9}}`) stay together under the
/// field's path, and the sub-filters of `$and`/`$or`/`$nor` are flattened in
/// turn. In update mode a document holding operator keys is kept as a literal
/// value.
pub fn flatten(document: Document, mode: FlattenMode) -> Document {
    let mut out = Document::new();
    for (key, value) in document {
        if key.starts_with('$') {
            out.insert(key, flatten_top_level_operator(value, mode));
        } else {
            flatten_into(&mut out, key, value, mode);
        }
    }
    out
}

fn flatten_top_level_operator(value: Value, mode: FlattenMode) -> Value {
    match (mode, value) {
        (FlattenMode::Read, Value::Array(items)) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Document(sub) => Value::Document(flatten(sub, mode)),
                    other => other,
                })
                .collect(),
        ),
        (_, value) => value,
    }
}

fn flatten_into(out: &mut Document, path: String, value: Value, mode: FlattenMode) {
    let nested = match value {
        Value::Document(nested) if !nested.is_empty() => nested,
        Value::Array(items) if mode == FlattenMode::Read && !items.is_empty() => {
            for (i, item) in items.into_iter().enumerate() {
                flatten_into(out, format!("{}.{}", path, i), item, mode);
            }
            return;
        }
        leaf => {
            out.insert(path, leaf);
            return;
        }
    };

    if mode == FlattenMode::Update && nested.keys().any(|k| k.starts_with('$')) {
        out.insert(path, nested);
        return;
    }

    let mut operators = Document::new();
    for (key, child) in nested {
        if key.starts_with('$') {
            operators.insert(key, child);
        } else {
            flatten_into(out, format!("{}.{}", path, key), child, mode);
        }
    }
    if !operators.is_empty() {
        out.insert(path, operators);
    }
}

/// Splits flat document data into a set/unset pair.
///
/// Null values become `$unset` entries; everything else is `$set` on its
/// dotted path.
pub fn to_update_operation(data: Document) -> UpdateOperation {
    let mut operation = UpdateOperation::default();
    for (path, value) in flatten(data, FlattenMode::Update) {
        if value.is_null() {
            operation.unset.push(path);
        } else {
            operation.set.insert(path, value);
        }
    }
    operation
}
