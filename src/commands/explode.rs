use crate::error::SearchError;
use crate::event::{record_field, Record};
use crate::flatten::flatten_into;
use crate::permissions::Caller;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::Parser;
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "explode", about = "Merge a nested mapping (or JSON text) field into each record")]
struct ExplodeArgs {
    field: String,

    /// Prepended to every merged key
    #[arg(long)]
    prefix: Option<String>,

    /// Flatten nested values into dot-joined keys
    #[arg(long)]
    flatten: bool,
}

pub fn command() -> Command {
    Command::from_parser::<ExplodeArgs>("explode", run)
}

fn nested(record: &Record, field: &str) -> Option<Record> {
    match record_field(record, field)? {
        Value::Object(obj) => Some(obj.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(obj)) => Some(obj),
            _ => None,
        },
        _ => None,
    }
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = ExplodeArgs::try_parse_from(argv)?;
    let stream = input.into_stream()?.map_records(move |mut record| {
        // Records without a mapping in the field pass through unchanged
        let Some(fields) = nested(&record, &args.field) else {
            return Ok(record);
        };
        let fields = if args.flatten {
            let mut flat = Record::new();
            flatten_into(&Value::Object(fields), "", &mut flat);
            flat
        } else {
            fields
        };
        for (key, value) in fields {
            let key = match &args.prefix {
                Some(prefix) => format!("{}{}", prefix, key),
                None => key,
            };
            record.insert(key, value);
        }
        Ok(record)
    });
    Ok(ResultSet::Stream(stream))
}
