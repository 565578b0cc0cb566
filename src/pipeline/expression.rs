//! `$field` substitution, `{{ name }}` templates and `field=value` expressions

use crate::event::{display_value, parse_literal, record_field, Record};
use crate::pipeline::environment::Environment;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

const NAME: &str = r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*";

static FIELD_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\$\$|\$\{{\s*({NAME})\s*\}}|\$({NAME})")).expect("valid field reference pattern")
});

static TEMPLATE_OR_FIELD_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\$\$|\$\{{\s*({NAME})\s*\}}|\$({NAME})|\{{\{{\s*({NAME})\s*\}}\}}"
    ))
    .expect("valid template pattern")
});

static FIELD_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^{NAME}$")).expect("valid field name pattern"));

/// Something `$name` references can be resolved against
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<&Value>;
}

impl Lookup for Environment {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.resolve(name)
    }
}

impl Lookup for Record {
    fn lookup(&self, name: &str) -> Option<&Value> {
        record_field(self, name)
    }
}

fn substitute(caps: &Captures, lookup: &dyn Lookup) -> String {
    let whole = caps.get(0).map_or("", |m| m.as_str());
    if whole == "$$" {
        return "$".to_string();
    }
    let name = caps
        .iter()
        .skip(1)
        .flatten()
        .next()
        .map(|m| m.as_str());
    match name.and_then(|n| lookup.lookup(n)) {
        Some(value) => display_value(value),
        None => whole.to_string(),
    }
}

/// Substitute `$name` and `${name}` references; unresolved references stay literal
pub fn expand(token: &str, lookup: &dyn Lookup) -> String {
    if !token.contains('$') {
        return token.to_string();
    }
    FIELD_REF
        .replace_all(token, |caps: &Captures| substitute(caps, lookup))
        .into_owned()
}

/// `expand` plus `{{ name }}` templates, in a single pass
pub fn render(text: &str, lookup: &dyn Lookup) -> String {
    if !text.contains('$') && !text.contains("{{") {
        return text.to_string();
    }
    TEMPLATE_OR_FIELD_REF
        .replace_all(text, |caps: &Captures| substitute(caps, lookup))
        .into_owned()
}

pub fn is_field_name(text: &str) -> bool {
    FIELD_NAME.is_match(text)
}

/// A `field=value` assignment, or a bare positional value when `field` is `None`
#[derive(Debug, Clone, PartialEq)]
pub struct FieldExpression {
    pub field: Option<String>,
    pub value: Value,
}

pub fn parse_field_expressions(tokens: &[String]) -> Vec<FieldExpression> {
    tokens
        .iter()
        .map(|token| match token.split_once('=') {
            Some((field, value)) if is_field_name(field) => FieldExpression {
                field: Some(field.to_string()),
                value: parse_literal(value),
            },
            _ => FieldExpression {
                field: None,
                value: parse_literal(token),
            },
        })
        .collect()
}

/// Split parsed expressions into positional values and keyword assignments
pub fn generate_keyword_args(expressions: &[FieldExpression]) -> (Vec<Value>, Record) {
    let mut positional = Vec::new();
    let mut keywords = Record::new();
    for expr in expressions {
        match &expr.field {
            Some(field) => {
                keywords.insert(field.clone(), expr.value.clone());
            }
            None => positional.push(expr.value.clone()),
        }
    }
    (positional, keywords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env() -> Environment {
        let mut env = Environment::new();
        env.set("host", json!("web01"));
        env.set("count", json!(3));
        env.set("geo", json!({"city": "Oslo"}));
        env
    }

    #[test]
    fn test_expand_substitutes_known_names() {
        let env = env();
        assert_eq!(expand("host=$host", &env), "host=web01");
        assert_eq!(expand("${count}x", &env), "3x");
        assert_eq!(expand("$geo.city", &env), "Oslo");
        assert_eq!(expand("plain", &env), "plain");
    }

    #[test]
    fn test_expand_leaves_unresolved_literal() {
        let env = env();
        assert_eq!(expand("$nope", &env), "$nope");
        assert_eq!(expand("${nope}", &env), "${nope}");
        assert_eq!(expand("cost $$5", &env), "cost $5");
        assert_eq!(expand("50$", &env), "50$");
    }

    #[test]
    fn test_render_templates() {
        let env = env();
        assert_eq!(render("host={{ host }} n=$count", &env), "host=web01 n=3");
        assert_eq!(render("{{missing}}", &env), "{{missing}}");
    }

    #[test]
    fn test_record_lookup_uses_extracted_fields() {
        let record = json!({"host": "a", "extracted_fields": {"svc": "api"}})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(expand("$host-$svc", &record), "a-api");
    }

    #[test]
    fn test_field_expressions() {
        let tokens: Vec<String> = ["host=web02", "level=None", "n=4", "stray", "a b=c"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let exprs = parse_field_expressions(&tokens);
        let (positional, keywords) = generate_keyword_args(&exprs);
        assert_eq!(positional, vec![json!("stray"), json!("a b=c")]);
        assert_eq!(keywords["host"], json!("web02"));
        assert_eq!(keywords["level"], Value::Null);
        assert_eq!(keywords["n"], json!(4));
    }
}
