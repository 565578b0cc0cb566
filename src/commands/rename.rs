use crate::error::SearchError;
use crate::event::take_field;
use crate::permissions::Caller;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "rename", about = "Rename a field on every record")]
struct RenameArgs {
    /// Field to rename; every record must have it, at top level or among its extracted fields
    #[arg(short = 'f', long = "from-field")]
    from_field: String,

    #[arg(short = 't', long = "to-field")]
    to_field: String,
}

pub fn command() -> Command {
    Command::from_parser::<RenameArgs>("rename", run)
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let RenameArgs { from_field, to_field } = RenameArgs::try_parse_from(argv)?;
    let stream = input.into_stream()?.map_records(move |mut record| {
        let value = take_field(&mut record, &from_field)
            .ok_or_else(|| SearchError::missing_field(from_field.as_str()))?;
        record.insert(to_field.clone(), value);
        Ok(record)
    });
    Ok(ResultSet::Stream(stream))
}
