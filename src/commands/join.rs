use crate::error::SearchError;
use crate::event::{record_field, Record};
use crate::permissions::Caller;
use crate::pipeline::resolve::{normalize, resolve};
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::{ArgAction, Parser, ValueEnum};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum JoinType {
    Inner,
    Left,
}

#[derive(Debug, Parser)]
#[command(name = "join", about = "Hash join the result set with the records of a subquery")]
struct JoinArgs {
    /// Join key (repeatable)
    #[arg(short = 'f', long = "field", action = ArgAction::Append, required = true, value_name = "FIELD")]
    fields: Vec<String>,

    #[arg(short = 't', long = "type", value_enum, default_value_t = JoinType::Inner)]
    join_type: JoinType,

    /// Nested query; quote it when it contains pipes
    #[arg(required = true, trailing_var_arg = true, value_name = "SUBQUERY")]
    subquery: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<JoinArgs>("join", run)
}

/// None when any key field is missing
fn join_key(record: &Record, fields: &[String]) -> Option<Vec<String>> {
    fields
        .iter()
        .map(|field| record_field(record, field).map(|v| v.to_string()))
        .collect()
}

fn run(
    engine: &Engine,
    caller: &Caller,
    input: ResultSet,
    argv: &[String],
    env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = JoinArgs::try_parse_from(argv)?;
    let left = resolve(input)?;
    let right = engine.run_subquery(&args.subquery.join(" "), caller, env)?;

    let mut index: HashMap<Vec<String>, Vec<&Record>> = HashMap::new();
    for record in &right {
        if let Some(key) = join_key(record, &args.fields) {
            index.entry(key).or_default().push(record);
        }
    }
    tracing::debug!(left = left.len(), right = right.len(), keys = index.len(), "joining");

    let mut joined = Vec::new();
    for record in left {
        let matches = join_key(&record, &args.fields).and_then(|key| index.get(&key));
        match matches {
            Some(matches) => {
                for other in matches {
                    // Left-hand values win on key collisions
                    let mut merged = record.clone();
                    for (key, value) in other.iter() {
                        if !merged.contains_key(key) {
                            merged.insert(key.clone(), value.clone());
                        }
                    }
                    joined.push(merged);
                }
            }
            None if args.join_type == JoinType::Left => joined.push(record),
            None => {}
        }
    }
    Ok(ResultSet::Materialized(normalize(joined)))
}
