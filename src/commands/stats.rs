use crate::error::SearchError;
use crate::event::{autocast, record_field, Record};
use crate::permissions::Caller;
use crate::pipeline::resolve::resolve;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use crate::store::compare_values;
use clap::{ArgAction, Parser};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

static FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(count|sum|avg|min|max|dc)(?:\(\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\))?$")
        .expect("valid aggregate pattern")
});

#[derive(Debug, Parser)]
#[command(name = "stats", about = "Aggregate records, optionally grouped by fields")]
struct StatsArgs {
    /// Group by this field (repeatable)
    #[arg(short = 'b', long = "by", action = ArgAction::Append, value_name = "FIELD")]
    by: Vec<String>,

    /// Also store the result in the environment under this name
    #[arg(short = 'c', long = "context", value_name = "NAME")]
    context: Option<String>,

    /// count, count(f), sum(f), avg(f), min(f), max(f), dc(f)
    #[arg(required = true, value_name = "FUNC")]
    functions: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<StatsArgs>("stats", run)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Distinct,
}

#[derive(Debug, Clone)]
struct Aggregate {
    label: String,
    kind: Kind,
    field: Option<String>,
}

impl Aggregate {
    fn parse(token: &str) -> Result<Self, SearchError> {
        let invalid = || SearchError::invalid(format!("invalid aggregate '{}'", token));
        let caps = FUNCTION.captures(token.trim()).ok_or_else(invalid)?;
        let kind = match &caps[1] {
            "count" => Kind::Count,
            "sum" => Kind::Sum,
            "avg" => Kind::Avg,
            "min" => Kind::Min,
            "max" => Kind::Max,
            _ => Kind::Distinct,
        };
        let field = caps.get(2).map(|m| m.as_str().to_string());
        if field.is_none() && kind != Kind::Count {
            return Err(SearchError::invalid(format!("aggregate '{}' needs a field, e.g. {}(bytes)", token, &caps[1])));
        }
        Ok(Aggregate {
            label: token.trim().to_string(),
            kind,
            field,
        })
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    count: usize,
    sum: f64,
    numeric: usize,
    extreme: Option<Value>,
    distinct: HashSet<String>,
}

impl Accumulator {
    fn add(&mut self, aggregate: &Aggregate, record: &Record) {
        let value = match &aggregate.field {
            None => {
                self.count += 1;
                return;
            }
            Some(field) => match record_field(record, field) {
                None | Some(Value::Null) => return,
                Some(value) => autocast(value),
            },
        };

        self.count += 1;
        if let Some(n) = value.as_f64() {
            self.sum += n;
            self.numeric += 1;
        }
        let replace = match (&self.extreme, aggregate.kind) {
            (None, _) => true,
            (Some(current), Kind::Min) => compare_values(Some(&value), Some(current)) == Ordering::Less,
            (Some(current), Kind::Max) => compare_values(Some(&value), Some(current)) == Ordering::Greater,
            _ => false,
        };
        if replace {
            self.extreme = Some(value.clone());
        }
        if aggregate.kind == Kind::Distinct {
            self.distinct.insert(value.to_string());
        }
    }

    fn finish(&self, kind: Kind) -> Value {
        match kind {
            Kind::Count => Value::from(self.count),
            Kind::Sum => number(self.sum),
            Kind::Avg if self.numeric == 0 => Value::Null,
            Kind::Avg => number(self.sum / self.numeric as f64),
            Kind::Min | Kind::Max => self.extreme.clone().unwrap_or(Value::Null),
            Kind::Distinct => Value::from(self.distinct.len()),
        }
    }
}

/// Integral results stay integers
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn aggregate(records: &[Record], by: &[String], aggregates: &[Aggregate]) -> Vec<Record> {
    let mut groups: IndexMap<Vec<String>, (Vec<Value>, Vec<Accumulator>)> = IndexMap::new();
    if by.is_empty() {
        groups.insert(Vec::new(), (Vec::new(), aggregates.iter().map(|_| Accumulator::default()).collect()));
    }

    for record in records {
        let values: Vec<Value> = by
            .iter()
            .map(|field| record_field(record, field).cloned().unwrap_or(Value::Null))
            .collect();
        let key = values.iter().map(|v| v.to_string()).collect();
        let (_, accumulators) = groups
            .entry(key)
            .or_insert_with(|| (values, aggregates.iter().map(|_| Accumulator::default()).collect()));
        for (accumulator, aggregate) in accumulators.iter_mut().zip(aggregates) {
            accumulator.add(aggregate, record);
        }
    }

    groups
        .into_values()
        .map(|(values, accumulators)| {
            let mut row: Record = by.iter().cloned().zip(values).collect();
            for (accumulator, aggregate) in accumulators.iter().zip(aggregates) {
                row.insert(aggregate.label.clone(), accumulator.finish(aggregate.kind));
            }
            row
        })
        .collect()
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = StatsArgs::try_parse_from(argv)?;
    let aggregates = args
        .functions
        .iter()
        .map(|token| Aggregate::parse(token))
        .collect::<Result<Vec<_>, _>>()?;

    let bare_count = args.by.is_empty()
        && aggregates.len() == 1
        && aggregates[0].kind == Kind::Count
        && aggregates[0].field.is_none();

    let rows = match input {
        ResultSet::Deferred(deferred) if bare_count => {
            tracing::debug!("count pushed down to store");
            let mut row = Record::new();
            row.insert(aggregates[0].label.clone(), Value::from(deferred.count()?));
            vec![row]
        }
        other => aggregate(&resolve(other)?, &args.by, &aggregates),
    };

    if let Some(name) = args.context {
        let scalar = match rows.as_slice() {
            [row] if row.len() == 1 => row.values().next().cloned(),
            _ => None,
        };
        let value = scalar.unwrap_or_else(|| Value::Array(rows.iter().cloned().map(Value::Object).collect()));
        env.set(name, value);
    }
    Ok(ResultSet::Materialized(rows))
}
