use crate::error::SearchError;
use crate::event::{type_name, Record};
use crate::pipeline::result_set::ResultSet;
use indexmap::IndexSet;
use serde_json::Value;

/// Normalize any result set into an ordered list of records sharing one key set.
/// Deferred input is materialized in store order; nothing is re-sorted.
pub fn resolve(result_set: ResultSet) -> Result<Vec<Record>, SearchError> {
    let records = match result_set {
        ResultSet::Empty => return Ok(Vec::new()),
        ResultSet::Deferred(deferred) => deferred.to_records()?,
        ResultSet::Materialized(records) => records,
        ResultSet::Stream(stream) => stream.materialize()?,
        ResultSet::Value(value) => value_to_records(value)?,
    };
    Ok(normalize(records))
}

/// Give every record the union of all keys (first-seen order), filling gaps with null
pub fn normalize(records: Vec<Record>) -> Vec<Record> {
    let mut columns: IndexSet<String> = IndexSet::new();
    for record in &records {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.insert(key.clone());
            }
        }
    }

    let uniform = records
        .iter()
        .all(|r| r.len() == columns.len() && r.keys().zip(columns.iter()).all(|(a, b)| a == b));
    if uniform {
        return records;
    }

    records
        .into_iter()
        .map(|mut record| {
            columns
                .iter()
                .map(|key| {
                    let value = record.get_mut(key).map(Value::take).unwrap_or(Value::Null);
                    (key.clone(), value)
                })
                .collect()
        })
        .collect()
}

/// Records carried by a non-record value: an object or an array of objects
pub fn value_to_records(value: Value) -> Result<Vec<Record>, SearchError> {
    match value {
        Value::Object(record) => Ok(vec![record]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                other => Err(mismatch(&other)),
            })
            .collect(),
        other => Err(mismatch(&other)),
    }
}

fn mismatch(value: &Value) -> SearchError {
    SearchError::TypeMismatch {
        command: "resolve".to_string(),
        expected: "record",
        found: type_name(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stream::RecordStream;
    use serde_json::json;

    fn records(value: Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_heterogeneous_keys_are_filled() {
        let input = records(json!([{"a": 1}, {"b": 2, "a": 3}, {"c": null}]));
        let out = resolve(ResultSet::Materialized(input)).unwrap();
        for record in &out {
            let keys: Vec<&String> = record.keys().collect();
            assert_eq!(keys, vec!["a", "b", "c"]);
        }
        assert_eq!(out[0]["b"], Value::Null);
        assert_eq!(out[1]["a"], json!(3));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let input = records(json!([{"x": 1}, {"y": "two"}]));
        let once = resolve(ResultSet::Stream(RecordStream::from_records(input))).unwrap();
        let twice = resolve(ResultSet::Materialized(once.clone())).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_values() {
        assert_eq!(resolve(ResultSet::Value(json!({"count": 3}))).unwrap().len(), 1);
        assert!(resolve(ResultSet::Empty).unwrap().is_empty());
        assert!(matches!(
            resolve(ResultSet::Value(json!(3))),
            Err(SearchError::TypeMismatch { found: "number", .. })
        ));
    }
}
