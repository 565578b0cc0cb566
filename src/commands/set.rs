use crate::error::SearchError;
use crate::permissions::Caller;
use crate::pipeline::expression::{generate_keyword_args, parse_field_expressions};
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "set", about = "Set environment variables for later stages")]
struct SetArgs {
    #[arg(required = true, value_name = "NAME=VALUE")]
    assignments: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<SetArgs>("set", run)
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = SetArgs::try_parse_from(argv)?;
    let (positional, assignments) = generate_keyword_args(&parse_field_expressions(&args.assignments));
    if let Some(stray) = positional.first() {
        return Err(SearchError::invalid(format!(
            "set expects NAME=VALUE assignments, got {}",
            stray
        )));
    }
    env.extend(assignments);
    Ok(input)
}
