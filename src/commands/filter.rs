use crate::error::SearchError;
use crate::permissions::Caller;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use crate::script::Expression;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "filter", about = "Keep records for which a Starlark expression is truthy")]
struct FilterArgs {
    /// Starlark expression; record fields are bound as variables, the whole record as `data`
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "EXPR")]
    expression: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<FilterArgs>("filter", run)
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = FilterArgs::try_parse_from(argv)?;
    let expression = Expression::compile("filter", &args.expression.join(" "))?;
    tracing::debug!(expression = expression.source(), "compiled filter");

    let env = env.clone();
    let stream = input
        .into_stream()?
        .filter_records(move |record| expression.matches(record, &env));
    Ok(ResultSet::Stream(stream))
}
