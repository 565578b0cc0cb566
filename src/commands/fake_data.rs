use crate::error::SearchError;
use crate::event::Record;
use crate::permissions::Caller;
use crate::pipeline::{Command, Engine, Environment, ResultSet, RecordStream};
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::Parser;
use serde_json::Value;

const HOSTS: &[&str] = &["web01", "web02", "db01", "cache01", "worker01"];
const USERS: &[&str] = &["alice", "bob", "carol", "dave"];
const METHODS: &[&str] = &["GET", "GET", "GET", "POST", "PUT", "DELETE"];
const STATUSES: &[u16] = &[200, 200, 200, 201, 204, 301, 404, 500];
const PATHS: &[&str] = &["/", "/login", "/api/items", "/api/items/42", "/static/app.js"];

#[derive(Debug, Parser)]
#[command(name = "fake_data", about = "Generate deterministic synthetic records")]
struct FakeDataArgs {
    /// Number of records; unbounded when omitted (bound it with `head`)
    #[arg(short = 'n', long = "count")]
    count: Option<usize>,

    #[arg(short = 'i', long = "index", default_value = "fake")]
    index: String,
}

pub fn command() -> Command {
    Command::from_parser::<FakeDataArgs>("fake_data", run)
}

fn epoch() -> DateTime<Utc> {
    // 2024-01-01T00:00:00Z
    Utc.timestamp_opt(1_704_067_200, 0).single().unwrap_or_default()
}

/// Record number `i`; the same `i` always yields the same record
fn fake_record(i: usize, index: &str) -> Record {
    let pick = |table: &[&str], stride: usize| table[(i * stride) % table.len()].to_string();
    let status = STATUSES[(i * 7) % STATUSES.len()];

    let mut record = Record::new();
    record.insert("index".to_string(), Value::from(index));
    record.insert("host".to_string(), Value::from(pick(HOSTS, 1)));
    record.insert("source".to_string(), Value::from("fake_data"));
    record.insert("sourcetype".to_string(), Value::from("json"));
    record.insert("seq".to_string(), Value::from(i));
    record.insert(
        "created".to_string(),
        Value::from((epoch() + Duration::seconds(i as i64)).to_rfc3339()),
    );
    record.insert("user".to_string(), Value::from(pick(USERS, 3)));
    record.insert("method".to_string(), Value::from(pick(METHODS, 5)));
    record.insert("path".to_string(), Value::from(pick(PATHS, 2)));
    record.insert("status".to_string(), Value::from(status));
    record.insert("bytes".to_string(), Value::from((i * 7919) % 5000 + 100));
    record
}

fn run(
    _engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = FakeDataArgs::try_parse_from(argv)?;
    let index = args.index;
    let generated = (0usize..).map(move |i| Ok(fake_record(i, &index)));
    let upstream = input.into_stream()?;

    let stream = match args.count {
        Some(count) => RecordStream::new(Iterator::chain(upstream, generated.take(count))),
        None => RecordStream::new(Iterator::chain(upstream, generated)),
    };
    Ok(ResultSet::Stream(stream))
}
