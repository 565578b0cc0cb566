use crate::error::SearchError;
use crate::permissions::{Action, Caller};
use crate::pipeline::expression::{generate_keyword_args, parse_field_expressions};
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::Parser;
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "update", about = "Bulk update fields on the events matched by a search")]
struct UpdateArgs {
    #[arg(value_name = "FIELD=VALUE")]
    field_expressions: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<UpdateArgs>("update", run)
}

fn run(
    engine: &Engine,
    caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = UpdateArgs::try_parse_from(argv)?;
    let deferred = input.into_deferred("update")?;
    engine.require(caller, Action::Change)?;

    let expressions = parse_field_expressions(&args.field_expressions);
    tracing::debug!(?expressions, "parsed update expressions");
    let (positional, changes) = generate_keyword_args(&expressions);
    if let Some(stray) = positional.first() {
        return Err(SearchError::invalid(format!(
            "update expects FIELD=VALUE assignments, got {}",
            stray
        )));
    }
    if changes.is_empty() {
        return Ok(ResultSet::Value(Value::from(0)));
    }

    let affected = deferred.update(&changes)?;
    tracing::info!(affected, user = %caller.username, "bulk update");
    Ok(ResultSet::Value(Value::from(affected)))
}
