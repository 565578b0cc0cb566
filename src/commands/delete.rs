use crate::error::SearchError;
use crate::permissions::{Action, Caller};
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::Parser;
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "delete", about = "Delete the events matched by a search")]
struct DeleteArgs {}

pub fn command() -> Command {
    Command::from_parser::<DeleteArgs>("delete", run)
}

fn run(
    engine: &Engine,
    caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    DeleteArgs::try_parse_from(argv)?;
    let deferred = input.into_deferred("delete")?;
    engine.require(caller, Action::Delete)?;

    let affected = deferred.delete()?;
    tracing::info!(affected, user = %caller.username, "bulk delete");
    Ok(ResultSet::Value(Value::from(affected)))
}
