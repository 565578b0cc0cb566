use crate::error::SearchError;
use crate::event::take_field;
use crate::permissions::Caller;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "drop_fields", about = "Remove the listed fields from every record")]
struct DropFieldsArgs {
    #[arg(required = true, value_name = "FIELD")]
    fields: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<DropFieldsArgs>("drop_fields", run)
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = DropFieldsArgs::try_parse_from(argv)?;
    let stream = input.into_stream()?.map_records(move |mut record| {
        for field in &args.fields {
            take_field(&mut record, field);
        }
        Ok(record)
    });
    Ok(ResultSet::Stream(stream))
}
