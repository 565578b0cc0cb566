use crate::error::SearchError;
use crate::permissions::Caller;
use crate::pipeline::expression::is_field_name;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use crate::script::Expression;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "eval", about = "Assign the result of Starlark expressions to fields")]
struct EvalArgs {
    /// `FIELD=EXPR`, applied left to right
    #[arg(required = true, allow_hyphen_values = true, value_name = "FIELD=EXPR")]
    assignments: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<EvalArgs>("eval", run)
}

fn compile(assignment: &str) -> Result<(String, Expression), SearchError> {
    match assignment.split_once('=') {
        Some((field, source)) if is_field_name(field) && !source.trim().is_empty() => {
            Ok((field.to_string(), Expression::compile("eval", source)?))
        }
        _ => Err(SearchError::invalid(format!(
            "invalid assignment '{}': expected FIELD=EXPR",
            assignment
        ))),
    }
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = EvalArgs::try_parse_from(argv)?;
    let assignments = args
        .assignments
        .iter()
        .map(|a| compile(a))
        .collect::<Result<Vec<_>, _>>()?;

    let env = env.clone();
    let stream = input.into_stream()?.map_records(move |mut record| {
        for (field, expression) in &assignments {
            let value = expression.evaluate(&record, &env)?;
            record.insert(field.clone(), value);
        }
        Ok(record)
    });
    Ok(ResultSet::Stream(stream))
}
