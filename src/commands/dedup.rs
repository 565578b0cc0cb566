use crate::error::SearchError;
use crate::event::record_field;
use crate::permissions::Caller;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::Parser;
use std::collections::HashSet;

#[derive(Debug, Parser)]
#[command(name = "dedup", about = "Keep the first record for each combination of field values")]
struct DedupArgs {
    #[arg(required = true, value_name = "FIELD")]
    fields: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<DedupArgs>("dedup", run)
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = DedupArgs::try_parse_from(argv)?;
    let mut seen: HashSet<Vec<Option<String>>> = HashSet::new();
    let stream = input.into_stream()?.filter_records(move |record| {
        let key = args
            .fields
            .iter()
            .map(|field| record_field(record, field).map(|v| v.to_string()))
            .collect();
        Ok(seen.insert(key))
    });
    Ok(ResultSet::Stream(stream))
}
