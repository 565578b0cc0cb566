use crate::error::SearchError;
use crate::permissions::Caller;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "last", about = "Return the last event of a search, in store order")]
struct LastArgs {}

pub fn command() -> Command {
    Command::from_parser::<LastArgs>("last", run)
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    LastArgs::try_parse_from(argv)?;
    let deferred = input.into_deferred("last")?;
    Ok(ResultSet::Materialized(deferred.last()?.into_iter().collect()))
}
