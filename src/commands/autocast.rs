use crate::error::SearchError;
use crate::event::{autocast, field_mut};
use crate::permissions::Caller;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "autocast", about = "Convert numeric and boolean looking strings into typed values")]
struct AutocastArgs {
    /// Fields to convert; every top-level field when omitted
    #[arg(value_name = "FIELD")]
    fields: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<AutocastArgs>("autocast", run)
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = AutocastArgs::try_parse_from(argv)?;
    let stream = input.into_stream()?.map_records(move |mut record| {
        if args.fields.is_empty() {
            for value in record.values_mut() {
                *value = autocast(value);
            }
        }
        for field in &args.fields {
            if let Some(value) = field_mut(&mut record, field) {
                *value = autocast(value);
            }
        }
        Ok(record)
    });
    Ok(ResultSet::Stream(stream))
}
