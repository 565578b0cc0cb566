//! Record-level Starlark expressions used by `filter` and `eval`

use crate::error::SearchError;
use crate::event::Record;
use crate::pipeline::environment::Environment;
use starlark::environment::{Globals, GlobalsBuilder, Module};
use starlark::eval::Evaluator;
use starlark::syntax::{AstModule, Dialect};
use starlark::values::{Heap, ValueLike};
use serde_json::Value;

fn dialect() -> Dialect {
    Dialect {
        enable_f_strings: true,
        ..Dialect::Extended
    }
}

/// A compiled Starlark expression evaluated once per record
pub struct Expression {
    name: String,
    source: String,
    globals: Globals,
}

impl std::fmt::Debug for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expression")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

impl Expression {
    /// Validate syntax up front so a bad expression fails before any record flows
    pub fn compile(name: &str, source: &str) -> Result<Self, SearchError> {
        AstModule::parse(name, source.to_string(), &dialect()).map_err(|e| SearchError::Script {
            expression: source.to_string(),
            message: e.to_string(),
        })?;

        Ok(Expression {
            name: name.to_string(),
            source: source.to_string(),
            globals: GlobalsBuilder::standard().build(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against one record. The record is bound as `data`, each identifier-safe
    /// key as its own variable, and the environment as `env`.
    pub fn evaluate(&self, record: &Record, env: &Environment) -> Result<Value, SearchError> {
        self.run(record, env).map_err(|e| SearchError::Script {
            expression: self.source.clone(),
            message: e.to_string(),
        })
    }

    /// Truthiness of the expression's value for one record
    pub fn matches(&self, record: &Record, env: &Environment) -> Result<bool, SearchError> {
        Ok(is_truthy(&self.evaluate(record, env)?))
    }

    fn run(&self, record: &Record, env: &Environment) -> anyhow::Result<Value> {
        let module = Module::new();
        let heap = module.heap();

        for (key, value) in record {
            if is_identifier(key) {
                module.set(key, json_to_starlark_value(heap, value)?);
            }
        }
        module.set("data", json_to_starlark_value(heap, &Value::Object(record.clone()))?);
        module.set("env", json_to_starlark_value(heap, &Value::Object(env.to_record()))?);

        let ast = AstModule::parse(&self.name, self.source.clone(), &dialect())
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        let mut eval = Evaluator::new(&module);
        let result = eval
            .eval_module(ast, &self.globals)
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        starlark_to_json_value(result)
    }
}

fn is_identifier(key: &str) -> bool {
    const RESERVED: &[&str] = &[
        "data", "env", "and", "or", "not", "in", "if", "else", "for", "def", "return", "pass",
        "break", "continue", "lambda", "load", "True", "False", "None",
    ];
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !RESERVED.contains(&key)
}

/// JSON truthiness, following Starlark's rules for the converted value
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(obj) => !obj.is_empty(),
    }
}

fn json_to_starlark_value<'v>(
    heap: &'v Heap,
    json: &Value,
) -> anyhow::Result<starlark::values::Value<'v>> {
    use starlark::values::Value as StarlarkValue;

    match json {
        Value::Null => Ok(StarlarkValue::new_none()),
        Value::Bool(b) => Ok(StarlarkValue::new_bool(*b)),
        Value::Number(n) => {
            // Starlark ints are arbitrary precision; only true floats become floats
            if let Some(i) = n.as_i64() {
                Ok(heap.alloc(i))
            } else if let Some(u) = n.as_u64() {
                Ok(heap.alloc(u))
            } else if let Some(f) = n.as_f64() {
                Ok(heap.alloc(f))
            } else {
                Ok(heap.alloc(n.to_string()))
            }
        }
        Value::String(s) => Ok(heap.alloc(s.as_str())),
        Value::Array(arr) => {
            let values = arr
                .iter()
                .map(|v| json_to_starlark_value(heap, v))
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok(heap.alloc(values))
        }
        Value::Object(obj) => {
            use starlark::collections::SmallMap;
            use starlark::values::dict::Dict;

            let mut content = SmallMap::new();
            for (k, v) in obj {
                let key = heap.alloc(k.as_str());
                let value = json_to_starlark_value(heap, v)?;
                content.insert_hashed(
                    key.get_hashed().map_err(|e| anyhow::anyhow!("{}", e))?,
                    value,
                );
            }
            Ok(heap.alloc(Dict::new(content)))
        }
    }
}

fn starlark_to_json_value(value: starlark::values::Value) -> anyhow::Result<Value> {
    use starlark::values::float::StarlarkFloat;
    use starlark::values::{dict::DictRef, list::ListRef};

    if value.is_none() {
        Ok(Value::Null)
    } else if let Some(b) = value.unpack_bool() {
        Ok(Value::Bool(b))
    } else if let Some(i) = value.unpack_i32() {
        Ok(Value::from(i))
    } else if let Some(s) = value.unpack_str() {
        Ok(Value::String(s.to_string()))
    } else if let Some(f) = value.downcast_ref::<StarlarkFloat>() {
        Ok(serde_json::Number::from_f64(f.0).map_or(Value::Null, Value::Number))
    } else if let Some(list) = ListRef::from_value(value) {
        let items = list
            .iter()
            .map(starlark_to_json_value)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Value::Array(items))
    } else if let Some(dict) = DictRef::from_value(value) {
        let mut obj = Record::new();
        for (k, v) in dict.iter() {
            let key = match k.unpack_str() {
                Some(s) => s.to_string(),
                None => k.to_string(),
            };
            obj.insert(key, starlark_to_json_value(v)?);
        }
        Ok(Value::Object(obj))
    } else {
        // Ints wider than i32 print as exact decimal digits
        let text = value.to_string();
        let number = match value.get_type() {
            "int" => text
                .parse::<i64>()
                .map(Value::from)
                .or_else(|_| text.parse::<u64>().map(Value::from))
                .ok(),
            _ => None,
        };
        Ok(number.unwrap_or(Value::String(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_fields_bound_as_variables() {
        let env = Environment::new();
        let expr = Expression::compile("filter", "status >= 500 and host.startswith('web')").unwrap();
        assert!(expr.matches(&record(json!({"status": 503, "host": "web01"})), &env).unwrap());
        assert!(!expr.matches(&record(json!({"status": 200, "host": "web01"})), &env).unwrap());
    }

    #[test]
    fn test_data_and_env_bindings() {
        let mut env = Environment::new();
        env.set("threshold", json!(3));
        let expr = Expression::compile("eval", "data['bytes-in'] * env['threshold']").unwrap();
        let value = expr.evaluate(&record(json!({"bytes-in": 7})), &env).unwrap();
        assert_eq!(value, json!(21));
    }

    #[test]
    fn test_large_and_float_values() {
        let env = Environment::new();
        let expr = Expression::compile("eval", "big + 1").unwrap();
        let value = expr.evaluate(&record(json!({"big": 10_000_000_000i64})), &env).unwrap();
        assert_eq!(value, json!(10_000_000_001i64));

        let expr = Expression::compile("eval", "ms + 1").unwrap();
        let value = expr.evaluate(&record(json!({"ms": 1_700_000_000_123i64})), &env).unwrap();
        assert_eq!(value, json!(1_700_000_000_124i64));

        let expr = Expression::compile("filter", "id == 9007199254740993").unwrap();
        assert!(expr.matches(&record(json!({"id": 9_007_199_254_740_993i64})), &env).unwrap());

        let expr = Expression::compile("eval", "x * 1.5").unwrap();
        let value = expr.evaluate(&record(json!({"x": 0.1})), &env).unwrap();
        assert_eq!(value, json!(0.1 * 1.5));

        let expr = Expression::compile("eval", "ratio / 2").unwrap();
        let value = expr.evaluate(&record(json!({"ratio": 5})), &env).unwrap();
        assert_eq!(value, json!(2.5));
    }

    #[test]
    fn test_errors_are_structured() {
        assert!(matches!(
            Expression::compile("filter", "x ==").unwrap_err(),
            SearchError::Script { .. }
        ));

        let env = Environment::new();
        let expr = Expression::compile("filter", "missing > 1").unwrap();
        let err = expr.evaluate(&record(json!({"x": 1})), &env).unwrap_err();
        assert!(matches!(err, SearchError::Script { .. }));
    }
}
