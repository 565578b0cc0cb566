use crate::error::SearchError;
use crate::event::{autocast, Record};
use crate::permissions::Caller;
use crate::pipeline::resolve::resolve;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::Parser;
use serde_json::{json, Value};

#[derive(Debug, Parser)]
#[command(name = "table", about = "Render records as a table visualization")]
struct TableArgs {
    /// Columns to include; every field of the first record when omitted, none when given empty
    #[arg(short = 'f', long = "fields", num_args = 0..)]
    fields: Option<Vec<String>>,
}

pub fn command() -> Command {
    Command::from_parser::<TableArgs>("table", run)
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Cell text: cast, HTML-escape strings, JSON-encode
pub fn encode_cell(value: &Value) -> String {
    match autocast(value) {
        Value::String(s) => Value::String(escape_html(&s)).to_string(),
        other => other.to_string(),
    }
}

/// Table descriptor consumed by the dashboard front-end
fn descriptor(columns: &[String], records: &[Record]) -> Value {
    let data: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|column| encode_cell(record.get(column).unwrap_or(&Value::Null)))
                .collect()
        })
        .collect();
    let columns: Vec<Value> = columns.iter().map(|c| json!({ "title": c })).collect();

    json!({
        "visualization": "table",
        "columns": columns,
        "data": data,
        "autowidth": true,
        "colReorder": true,
        "order": [],
        "columnDefs": [
            { "targets": "_all", "className": "dt-body-left" }
        ],
        "layout": {
            "topEnd": null,
            "topStart": { "buttons": ["colvis", "print", "copy", "csv", "excel"] },
            "top": ["pageLength", "info", "paging", "search"],
            "bottom": ["paging"],
            "bottomStart": null,
            "bottomEnd": null
        }
    })
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = TableArgs::try_parse_from(argv)?;
    let records = resolve(input)?;
    let columns = match args.fields {
        Some(fields) => fields,
        None => records
            .first()
            .map(|record| record.keys().cloned().collect())
            .unwrap_or_default(),
    };
    Ok(ResultSet::Value(descriptor(&columns, &records)))
}
