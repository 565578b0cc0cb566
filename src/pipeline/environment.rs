use crate::event::{lookup_path, Record};
use crate::permissions::Caller;
use indexmap::IndexMap;
use serde_json::Value;

/// Per-query variables threaded through every stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    vars: IndexMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh environment seeded with `now` and the caller's username
    pub fn for_caller(caller: &Caller) -> Self {
        let mut env = Self::new();
        env.set("now", Value::String(chrono::Utc::now().to_rfc3339()));
        env.set("user", Value::String(caller.username.clone()));
        env
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Resolve a variable, descending into mappings for dotted names
    pub fn resolve(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.vars.get(name) {
            return Some(value);
        }
        let (head, rest) = name.split_once('.')?;
        match self.vars.get(head)? {
            Value::Object(obj) => lookup_path(obj, rest),
            _ => None,
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.vars.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    pub fn to_record(&self) -> Record {
        self.vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Environment {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl<K: Into<String>> Extend<(K, Value)> for Environment {
    fn extend<I: IntoIterator<Item = (K, Value)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.vars.insert(k.into(), v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seeded_for_caller() {
        let env = Environment::for_caller(&Caller::new("alice"));
        assert_eq!(env.get("user"), Some(&json!("alice")));
        assert!(env.contains("now"));
    }

    #[test]
    fn test_dotted_resolution() {
        let mut env = Environment::new();
        env.set("limits", json!({"max": 5, "nested": {"x": true}}));
        assert_eq!(env.resolve("limits.max"), Some(&json!(5)));
        assert_eq!(env.resolve("limits.nested.x"), Some(&json!(true)));
        assert_eq!(env.resolve("limits.min"), None);
        assert_eq!(env.resolve("nope.max"), None);
    }
}
