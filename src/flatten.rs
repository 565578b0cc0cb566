//! Flattening of nested record values into dot-joined keys

use crate::event::Record;
use serde_json::Value;

/// Flatten a whole record.
///
/// - `{"user": {"name": "Alice"}}` → `{"user.name": "Alice"}`
/// - `{"tags": ["a", "b"]}` → `{"tags.0": "a", "tags.1": "b"}`
pub fn flatten_record(record: &Record) -> Record {
    let mut flat = Record::new();
    for (key, value) in record {
        flatten_into(value, key, &mut flat);
    }
    flat
}

/// Flatten `value` into `out`, keys prefixed with `prefix` (no prefix when empty)
pub fn flatten_into(value: &Value, prefix: &str, out: &mut Record) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        }
    };

    match value {
        Value::Object(obj) => {
            for (key, inner) in obj {
                flatten_into(inner, &join(key), out);
            }
        }
        Value::Array(items) => {
            for (index, inner) in items.iter().enumerate() {
                flatten_into(inner, &join(&index.to_string()), out);
            }
        }
        scalar => {
            out.insert(prefix.to_string(), scalar.clone());
        }
    }
}

pub fn has_nested_data(record: &Record) -> bool {
    record
        .values()
        .any(|v| matches!(v, Value::Object(_) | Value::Array(_)))
}
