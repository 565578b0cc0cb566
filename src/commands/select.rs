use crate::error::SearchError;
use crate::event::{record_field, Record};
use crate::permissions::Caller;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::Parser;
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "select", about = "Keep only the listed fields, in the listed order")]
struct SelectArgs {
    #[arg(required = true, value_name = "FIELD")]
    fields: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<SelectArgs>("select", run)
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = SelectArgs::try_parse_from(argv)?;
    let stream = input.into_stream()?.map_records(move |record| {
        Ok(args
            .fields
            .iter()
            .map(|field| {
                let value = record_field(&record, field).cloned().unwrap_or(Value::Null);
                (field.clone(), value)
            })
            .collect::<Record>())
    });
    Ok(ResultSet::Stream(stream))
}
