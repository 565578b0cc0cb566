use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A record flowing through the pipeline: an insertion-ordered mapping of field names to values
pub type Record = Map<String, Value>;

/// Field names every stored event exposes
pub const CANONICAL_FIELDS: &[&str] = &[
    "id",
    "index",
    "host",
    "source",
    "sourcetype",
    "raw",
    "text",
    "extracted_fields",
    "tags",
    "user",
    "created",
];

/// A stored event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: Option<u64>,
    pub index: String,
    pub host: String,
    pub source: String,
    pub sourcetype: String,
    #[serde(default)]
    pub raw: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub extracted_fields: Record,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
}

impl Event {
    pub fn new(
        index: impl Into<String>,
        host: impl Into<String>,
        source: impl Into<String>,
        sourcetype: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        Event {
            id: None,
            index: index.into(),
            host: host.into(),
            source: source.into(),
            sourcetype: sourcetype.into(),
            raw: text.clone(),
            text,
            extracted_fields: Record::new(),
            tags: BTreeSet::new(),
            user: None,
            created: Utc::now(),
        }
    }

    /// Parse `text` as a JSON object into `extracted_fields`, if it is one
    pub fn extract_fields(&mut self) {
        if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(&self.text) {
            self.extracted_fields = fields;
        }
    }

    /// Resolve a canonical field, a dotted path, or a top-level extracted field
    pub fn field(&self, name: &str) -> Option<Value> {
        let (head, rest) = match name.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (name, None),
        };

        let value = match head {
            "id" => self.id.map(Value::from).unwrap_or(Value::Null),
            "index" => Value::String(self.index.clone()),
            "host" => Value::String(self.host.clone()),
            "source" => Value::String(self.source.clone()),
            "sourcetype" => Value::String(self.sourcetype.clone()),
            "raw" => Value::String(self.raw.clone()),
            "text" => Value::String(self.text.clone()),
            "user" => self.user.clone().map(Value::String).unwrap_or(Value::Null),
            "created" => Value::String(self.created.to_rfc3339()),
            "tags" => Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
            "extracted_fields" => Value::Object(self.extracted_fields.clone()),
            _ => return lookup_path(&self.extracted_fields, name).cloned(),
        };

        match rest {
            Some(path) => match &value {
                Value::Object(obj) => lookup_path(obj, path).cloned(),
                _ => None,
            },
            None => Some(value),
        }
    }

    /// Apply a single bulk-update assignment
    pub fn set_field(&mut self, name: &str, value: &Value) -> Result<(), StoreError> {
        if let Some(path) = name.strip_prefix("extracted_fields.") {
            set_path(&mut self.extracted_fields, path, value.clone());
            return Ok(());
        }

        match name {
            "index" => self.index = display_value(value),
            "host" => self.host = display_value(value),
            "source" => self.source = display_value(value),
            "sourcetype" => self.sourcetype = display_value(value),
            "raw" => self.raw = display_value(value),
            "text" => self.text = display_value(value),
            "extracted_fields" => match value {
                Value::Object(obj) => self.extracted_fields = obj.clone(),
                _ => {
                    return Err(StoreError::InvalidValue {
                        field: name.to_string(),
                        message: "expected a mapping".to_string(),
                    })
                }
            },
            "tags" => {
                self.tags = match value {
                    Value::Array(items) => items.iter().map(display_value).collect(),
                    Value::Null => BTreeSet::new(),
                    other => std::iter::once(display_value(other)).collect(),
                }
            }
            "id" | "created" | "user" => return Err(StoreError::ReadOnlyField(name.to_string())),
            _ => return Err(StoreError::UnknownField(name.to_string())),
        }
        Ok(())
    }

    /// Project into a pipeline record: canonical fields in a fixed order
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        for name in CANONICAL_FIELDS {
            record.insert(name.to_string(), self.field(name).unwrap_or(Value::Null));
        }
        record
    }
}

/// Walk a dotted path through nested objects
pub fn lookup_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    if let Some(value) = record.get(path) {
        return Some(value);
    }
    let mut parts = path.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(obj) => obj.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a field on a projected record, falling back to its `extracted_fields`
pub fn record_field<'a>(record: &'a Record, name: &str) -> Option<&'a Value> {
    lookup_path(record, name).or_else(|| match record.get("extracted_fields") {
        Some(Value::Object(extracted)) => lookup_path(extracted, name),
        _ => None,
    })
}

fn set_path(record: &mut Record, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            record.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = record
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Record::new()));
            if !entry.is_object() {
                *entry = Value::Object(Record::new());
            }
            if let Value::Object(inner) = entry {
                set_path(inner, rest, value);
            }
        }
    }
}

/// String form of a value: strings unquoted, everything else as JSON
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a literal from query text: JSON when it parses, Python-style constants, else a string
pub fn parse_literal(text: &str) -> Value {
    match text {
        "None" => return Value::Null,
        "True" => return Value::Bool(true),
        "False" => return Value::Bool(false),
        _ => {}
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Convert numeric and boolean looking strings into typed values
pub fn autocast(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Value::from(i)
            } else if let Some(n) = trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .and_then(serde_json::Number::from_f64)
            {
                Value::Number(n)
            } else {
                match trimmed {
                    "true" | "True" => Value::Bool(true),
                    "false" | "False" => Value::Bool(false),
                    _ => value.clone(),
                }
            }
        }
        other => other.clone(),
    }
}

/// Name of a value's JSON type, for error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}

/// Remove a key while keeping the order of the remaining keys
pub fn remove_field(record: &mut Record, key: &str) -> Option<Value> {
    if !record.contains_key(key) {
        return None;
    }
    let mut removed = None;
    let old = std::mem::take(record);
    for (k, v) in old {
        if k == key {
            removed = Some(v);
        } else {
            record.insert(k, v);
        }
    }
    removed
}

/// Remove a top-level field, falling back to the record's `extracted_fields`
pub fn take_field(record: &mut Record, key: &str) -> Option<Value> {
    if record.contains_key(key) {
        return remove_field(record, key);
    }
    match record.get_mut("extracted_fields") {
        Some(Value::Object(extracted)) => remove_field(extracted, key),
        _ => None,
    }
}

/// Mutable counterpart of a top-level lookup with the `extracted_fields` fallback
pub fn field_mut<'a>(record: &'a mut Record, key: &str) -> Option<&'a mut Value> {
    if record.contains_key(key) {
        return record.get_mut(key);
    }
    match record.get_mut("extracted_fields") {
        Some(Value::Object(extracted)) => extracted.get_mut(key),
        _ => None,
    }
}
