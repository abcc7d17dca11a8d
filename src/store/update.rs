//! Applying set/unset updates to stored documents.

use super::errors::{StoreError, StoreResult};
use super::UpdateOperation;
use crate::value::{values_equal, Document, Value};

const ID_FIELD: &str = "_id";

/// Applies an update in place. `_id` may be set only to its current value.
pub fn apply_update(doc: &mut Document, update: &UpdateOperation) -> StoreResult<()> {
    if update.is_empty() {
        return Err(StoreError::failed_to_parse(
            "update document requires at least one $set or $unset path",
        ));
    }

    for (path, value) in update.set.iter() {
        if touches_id(path) {
            let current = doc.get_path(path);
            if !current.is_some_and(|c| values_equal(c, value)) {
                return Err(StoreError::immutable_field(path));
            }
            continue;
        }
        set_path(doc, path, value.clone())?;
    }

    for path in &update.unset {
        if touches_id(path) {
            return Err(StoreError::immutable_field(path));
        }
        unset_path(doc, path);
    }

    Ok(())
}

fn touches_id(path: &str) -> bool {
    path == ID_FIELD || path.starts_with("_id.")
}

fn set_path(doc: &mut Document, path: &str, value: Value) -> StoreResult<()> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    if head.is_empty() {
        return Err(StoreError::bad_value(format!("empty field name in path '{}'", path)));
    }

    let Some(rest) = rest else {
        doc.insert(head, value);
        return Ok(());
    };

    if !doc.contains_key(head) {
        doc.insert(head, Document::new());
    }
    match doc.get_mut(head) {
        Some(child) => set_in_value(child, path, rest, value),
        None => Err(StoreError::internal("field vanished during update")),
    }
}

fn set_in_value(target: &mut Value, full_path: &str, rest: &str, value: Value) -> StoreResult<()> {
    match target {
        Value::Document(child) => set_path(child, rest, value),
        Value::Array(items) => {
            let (segment, tail) = match rest.split_once('.') {
                Some((segment, tail)) => (segment, Some(tail)),
                None => (rest, None),
            };
            let index: usize = segment.parse().map_err(|_| {
                StoreError::bad_value(format!(
                    "cannot create field '{}' in array element of '{}'",
                    segment, full_path
                ))
            })?;
            while items.len() <= index {
                items.push(Value::Null);
            }
            match tail {
                None => {
                    items[index] = value;
                    Ok(())
                }
                Some(tail) => {
                    if items[index].is_null() {
                        items[index] = Value::Document(Document::new());
                    }
                    set_in_value(&mut items[index], full_path, tail, value)
                }
            }
        }
        other => Err(StoreError::bad_value(format!(
            "cannot create field in element of type {} while setting '{}'",
            other.type_name(),
            full_path
        ))),
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Value::Document(child)) => unset_path(child, rest),
            Some(Value::Array(items)) => unset_in_array(items, rest),
            _ => {}
        },
    }
}

/// Unsetting an array element nulls it rather than shifting the array.
fn unset_in_array(items: &mut [Value], rest: &str) {
    let (segment, tail) = match rest.split_once('.') {
        Some((segment, tail)) => (segment, Some(tail)),
        None => (rest, None),
    };
    let Ok(index) = segment.parse::<usize>() else {
        return;
    };
    match (items.get_mut(index), tail) {
        (Some(slot), None) => *slot = Value::Null,
        (Some(Value::Document(child)), Some(tail)) => unset_path(child, tail),
        (Some(Value::Array(inner)), Some(tail)) => unset_in_array(inner, tail),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn op(set: Document, unset: &[&str]) -> UpdateOperation {
        UpdateOperation {
            set,
            unset: unset.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_set_creates_intermediate_documents() {
        let mut doc = doc! { "name" => "a" };
        apply_update(&mut doc, &op(doc! { "address.city" => "Oslo" }, &[])).unwrap();
        assert_eq!(doc.get_path("address.city"), Some(&Value::from("Oslo")));
    }

    #[test]
    fn test_set_replaces_whole_arrays_and_indexes_into_them() {
        let mut doc = doc! { "tags" => vec![Value::from("a")] };
        apply_update(&mut doc, &op(doc! { "tags.2" => "c" }, &[])).unwrap();
        assert_eq!(
            doc.get("tags"),
            Some(&Value::Array(vec![Value::from("a"), Value::Null, Value::from("c")]))
        );

        apply_update(&mut doc, &op(doc! { "tags" => vec![Value::from("z")] }, &[])).unwrap();
        assert_eq!(doc.get("tags"), Some(&Value::Array(vec![Value::from("z")])));
    }

    #[test]
    fn test_unset_removes_fields() {
        let mut doc = doc! { "a" => 1, "b" => doc! { "c" => 2, "d" => 3 } };
        apply_update(&mut doc, &op(doc! {}, &["a", "b.c", "missing.path"])).unwrap();
        assert_eq!(doc, doc! { "b" => doc! { "d" => 3 } });
    }

    #[test]
    fn test_id_is_immutable() {
        let id = crate::value::ObjectId::new();
        let mut doc = doc! { "_id" => id, "a" => 1 };
        assert!(apply_update(&mut doc, &op(doc! { "_id" => id, "a" => 2 }, &[])).is_ok());
        let err = apply_update(&mut doc, &op(doc! { "_id" => "other" }, &[])).unwrap_err();
        assert_eq!(err.code, crate::store::codes::IMMUTABLE_FIELD);
        assert!(apply_update(&mut doc, &op(doc! {}, &["_id"])).is_err());
    }

    #[test]
    fn test_empty_update_rejected() {
        let mut doc = doc! { "a" => 1 };
        assert!(apply_update(&mut doc, &UpdateOperation::default()).is_err());
    }

    #[test]
    fn test_cannot_descend_into_scalar() {
        let mut doc = doc! { "a" => 1 };
        assert!(apply_update(&mut doc, &op(doc! { "a.b" => 2 }, &[])).is_err());
    }
}
