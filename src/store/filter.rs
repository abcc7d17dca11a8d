//! Filter evaluation over dotted paths.
//!
//! Supported operators: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
//! `$nin`, `$exists` on fields and `$and`, `$or`, `$nor` at the top level.
//! A path that crosses an array matches when any element matches.

use std::cmp::Ordering;

use super::errors::{StoreError, StoreResult};
use crate::value::{compare_values, values_equal, Document, Value};

/// Checks whether a document satisfies a filter.
pub fn matches_filter(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter.iter() {
        let matched = match key {
            "$and" => sub_filters(key, condition)?
                .iter()
                .try_fold(true, |acc, f| Ok::<_, StoreError>(acc && matches_filter(doc, f)?))?,
            "$or" => any_matches(doc, key, condition)?,
            "$nor" => !any_matches(doc, key, condition)?,
            k if k.starts_with('$') => {
                return Err(StoreError::bad_value(format!("unknown top level operator: {}", k)))
            }
            path => matches_condition(doc, path, condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters<'a>(op: &str, condition: &'a Value) -> StoreResult<Vec<&'a Document>> {
    let items = condition
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| StoreError::bad_value(format!("{} must be a nonempty array", op)))?;
    items
        .iter()
        .map(|item| {
            item.as_document()
                .ok_or_else(|| StoreError::bad_value(format!("{} entries must be objects", op)))
        })
        .collect()
}

fn any_matches(doc: &Document, op: &str, condition: &Value) -> StoreResult<bool> {
    for f in sub_filters(op, condition)? {
        if matches_filter(doc, f)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// True when every key of a non-empty document is an operator.
pub(crate) fn is_operator_document(value: &Value) -> bool {
    match value {
        Value::Document(doc) => !doc.is_empty() && doc.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn matches_condition(doc: &Document, path: &str, condition: &Value) -> StoreResult<bool> {
    let candidates = resolve(doc, path);

    if !is_operator_document(condition) {
        return Ok(equals_any(&candidates, condition));
    }

    let operators = condition.as_document().map(Document::iter).into_iter().flatten();
    for (op, operand) in operators {
        let ok = match op {
            "$eq" => equals_any(&candidates, operand),
            "$ne" => !equals_any(&candidates, operand),
            "$gt" => compares_any(&candidates, operand, |o| o == Ordering::Greater),
            "$gte" => compares_any(&candidates, operand, |o| o != Ordering::Less),
            "$lt" => compares_any(&candidates, operand, |o| o == Ordering::Less),
            "$lte" => compares_any(&candidates, operand, |o| o != Ordering::Greater),
            "$in" => in_list(&candidates, op, operand)?,
            "$nin" => !in_list(&candidates, op, operand)?,
            "$exists" => {
                let wanted = match operand {
                    Value::Boolean(b) => *b,
                    other => other.as_f64().map(|n| n != 0.0).unwrap_or(true),
                };
                candidates.is_empty() != wanted
            }
            other => return Err(StoreError::bad_value(format!("unknown operator: {}", other))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Collects every value reachable through `path`.
fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some(first) = doc.get(segments[0]) {
        collect(first, &segments[1..], &mut out);
    }
    out
}

fn collect<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((segment, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Document(doc) => {
            if let Some(child) = doc.get(segment) {
                collect(child, rest, out);
            }
        }
        Value::Array(items) => match segment.parse::<usize>() {
            Ok(index) => {
                if let Some(child) = items.get(index) {
                    collect(child, rest, out);
                }
            }
            Err(_) => {
                for item in items {
                    if matches!(item, Value::Document(_)) {
                        collect(item, segments, out);
                    }
                }
            }
        },
        _ => {}
    }
}

fn equals_any(candidates: &[&Value], target: &Value) -> bool {
    if target.is_null() && (candidates.is_empty() || candidates.iter().any(|c| c.is_null())) {
        return true;
    }
    candidates.iter().any(|candidate| {
        values_equal(candidate, target)
            || matches!(candidate, Value::Array(items) if items.iter().any(|i| values_equal(i, target)))
    })
}

fn compares_any(candidates: &[&Value], target: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |value: &Value| comparable(value, target) && accept(compare_values(value, target));
    candidates.iter().copied().any(|candidate| match candidate {
        Value::Array(items) => items.iter().any(|item| check(item)),
        other => check(other),
    })
}

/// Range operators only compare values of the same kind.
fn comparable(a: &Value, b: &Value) -> bool {
    (a.as_f64().is_some() && b.as_f64().is_some())
        || std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn in_list(candidates: &[&Value], op: &str, operand: &Value) -> StoreResult<bool> {
    let list = operand
        .as_array()
        .ok_or_else(|| StoreError::bad_value(format!("{} needs an array", op)))?;
    Ok(list.iter().any(|target| equals_any(candidates, target)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn sample() -> Document {
        doc! {
            "name" => "Alice",
            "age" => 30,
            "address" => doc! { "city" => "Paris" },
            "tags" => vec![Value::from("a"), Value::from("b")],
            "items" => vec![
                Value::from(doc! { "sku" => "x", "qty" => 1 }),
                Value::from(doc! { "sku" => "y", "qty" => 5 }),
            ],
            "isSoftDeleted" => false,
        }
    }

    fn check(filter: Document) -> bool {
        matches_filter(&sample(), &filter).unwrap()
    }

    #[test]
    fn test_equality_and_dotted_paths() {
        assert!(check(doc! { "name" => "Alice" }));
        assert!(check(doc! { "address.city" => "Paris" }));
        assert!(!check(doc! { "address.city" => "Rome" }));
        assert!(check(doc! { "isSoftDeleted" => false }));
        assert!(check(doc! {}));
    }

    #[test]
    fn test_array_paths() {
        assert!(check(doc! { "tags" => "b" }));
        assert!(check(doc! { "tags.0" => "a" }));
        assert!(!check(doc! { "tags.0" => "b" }));
        assert!(check(doc! { "items.sku" => "y" }));
        assert!(check(doc! { "items.1.qty" => 5 }));
    }

    #[test]
    fn test_comparison_operators() {
        assert!(check(doc! { "age" => doc! { "$gt" => 20, "$lte" => 30 } }));
        assert!(!check(doc! { "age" => doc! { "$lt" => 30 } }));
        assert!(check(doc! { "age" => doc! { "$gte" => 29.5 } }));
        assert!(!check(doc! { "name" => doc! { "$gt" => 5 } }));
        assert!(check(doc! { "items.qty" => doc! { "$gt" => 4 } }));
    }

    #[test]
    fn test_set_operators() {
        assert!(check(doc! { "name" => doc! { "$in" => vec![Value::from("Bob"), Value::from("Alice")] } }));
        assert!(check(doc! { "name" => doc! { "$nin" => vec![Value::from("Bob")] } }));
        assert!(check(doc! { "name" => doc! { "$ne" => "Bob" } }));
    }

    #[test]
    fn test_exists_and_null() {
        assert!(check(doc! { "missing" => doc! { "$exists" => false } }));
        assert!(check(doc! { "age" => doc! { "$exists" => true } }));
        assert!(check(doc! { "missing" => Value::Null }));
        assert!(!check(doc! { "age" => Value::Null }));
    }

    #[test]
    fn test_logical_operators() {
        assert!(check(doc! { "$or" => vec![Value::from(doc! { "name" => "Bob" }), Value::from(doc! { "age" => 30 })] }));
        assert!(!check(doc! { "$and" => vec![Value::from(doc! { "name" => "Alice" }), Value::from(doc! { "age" => 31 })] }));
        assert!(check(doc! { "$nor" => vec![Value::from(doc! { "name" => "Bob" })] }));
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        assert!(matches_filter(&sample(), &doc! { "age" => doc! { "$near" => 1 } }).is_err());
        assert!(matches_filter(&sample(), &doc! { "$where" => "x" }).is_err());
    }
}
