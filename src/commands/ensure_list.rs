use crate::error::SearchError;
use crate::event::field_mut;
use crate::permissions::Caller;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::Parser;
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "ensure_list", about = "Wrap non-list field values in a list")]
struct EnsureListArgs {
    #[arg(required = true, value_name = "FIELD")]
    fields: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<EnsureListArgs>("ensure_list", run)
}

fn as_list(value: Value) -> Value {
    match value {
        Value::Array(_) => value,
        Value::Null => Value::Array(Vec::new()),
        other => Value::Array(vec![other]),
    }
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = EnsureListArgs::try_parse_from(argv)?;
    let stream = input.into_stream()?.map_records(move |mut record| {
        for field in &args.fields {
            if let Some(value) = field_mut(&mut record, field) {
                *value = as_list(value.take());
            }
        }
        Ok(record)
    });
    Ok(ResultSet::Stream(stream))
}
