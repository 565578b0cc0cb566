use crate::error::SearchError;
use crate::permissions::Caller;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "head", about = "Keep only the first N records")]
struct HeadArgs {
    #[arg(short = 'n', long = "count", default_value_t = 10)]
    count: usize,
}

pub fn command() -> Command {
    Command::from_parser::<HeadArgs>("head", run)
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = HeadArgs::try_parse_from(argv)?;
    match input {
        ResultSet::Empty => Ok(ResultSet::Empty),
        ResultSet::Deferred(deferred) => Ok(ResultSet::Deferred(deferred.limit(args.count))),
        ResultSet::Materialized(mut records) => {
            records.truncate(args.count);
            Ok(ResultSet::Materialized(records))
        }
        other => Ok(ResultSet::Stream(other.into_stream()?.limit(args.count))),
    }
}
