use crate::operators::to_number;
use serde_json::Value;
use std::cmp::Ordering;

/// Loose equality (`==`): numbers, numeric strings and booleans compare by
/// numeric value, null only equals null, composites compare structurally.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(sa), Value::String(sb)) => sa == sb,
        (Value::Array(_), _) | (Value::Object(_), _) | (_, Value::Array(_)) | (_, Value::Object(_)) => {
            a == b
        }
        _ => match (to_number(a), to_number(b)) {
            (Some(da), Some(db)) => da == db,
            _ => false,
        },
    }
}

/// Ordering for `<`, `<=`, `>`, `>=`. Two strings compare lexicographically,
/// anything else numerically; `None` when the operands are not comparable.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(sa), Value::String(sb)) => Some(sa.cmp(sb)),
        _ => {
            let da = to_number(a)?;
            let db = to_number(b)?;
            da.partial_cmp(&db)
        }
    }
}

/// `needle in haystack`: substring test for strings, membership for arrays,
/// key lookup for objects.
pub fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => match needle {
            Value::String(n) => s.contains(n.as_str()),
            other => s.contains(&crate::operators::to_js_string(other)),
        },
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::Object(map) => needle.as_str().is_some_and(|k| map.contains_key(k)),
        _ => false,
    }
}
