use crate::error::SearchError;
use crate::event::Record;
use crate::permissions::Caller;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::Parser;
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "echo", about = "Append literal JSON records to the result set")]
struct EchoArgs {
    /// A JSON object or an array of objects
    #[arg(required = true, value_name = "JSON")]
    records: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<EchoArgs>("echo", run)
}

fn parse_records(text: &str) -> Result<Vec<Record>, SearchError> {
    let invalid = || SearchError::invalid(format!("echo expects a JSON object or an array of objects, got '{}'", text));
    match serde_json::from_str::<Value>(text).map_err(|_| invalid())? {
        Value::Object(record) => Ok(vec![record]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                _ => Err(invalid()),
            })
            .collect(),
        _ => Err(invalid()),
    }
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = EchoArgs::try_parse_from(argv)?;
    let mut records = Vec::new();
    for text in &args.records {
        records.extend(parse_records(text)?);
    }
    Ok(ResultSet::Stream(input.into_stream()?.chain(records)))
}
