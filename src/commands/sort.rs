use crate::error::SearchError;
use crate::event::record_field;
use crate::permissions::Caller;
use crate::pipeline::resolve::resolve;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use crate::store::{compare_values, OrderBy};
use clap::Parser;
use std::cmp::Ordering;

#[derive(Debug, Parser)]
#[command(name = "sort", about = "Order records by one or more fields")]
struct SortArgs {
    /// Descending order
    #[arg(short = 'r', long = "reverse")]
    reverse: bool,

    #[arg(required = true, value_name = "FIELD")]
    fields: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<SortArgs>("sort", run)
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = SortArgs::try_parse_from(argv)?;

    // A limit applies before the reorder, so limited queries sort in memory
    let input = match input {
        ResultSet::Deferred(deferred) if deferred.spec().limit.is_none() => {
            tracing::debug!(fields = ?args.fields, "sort pushed down to store");
            let keys = args
                .fields
                .iter()
                .map(|field| OrderBy {
                    field: field.clone(),
                    descending: args.reverse,
                })
                .collect();
            return Ok(ResultSet::Deferred(deferred.order_by(keys)));
        }
        other => other,
    };

    let mut records = resolve(input)?;
    records.sort_by(|a, b| {
        for field in &args.fields {
            let ordering = compare_values(record_field(a, field), record_field(b, field));
            if ordering != Ordering::Equal {
                return if args.reverse { ordering.reverse() } else { ordering };
            }
        }
        Ordering::Equal
    });
    Ok(ResultSet::Materialized(records))
}
