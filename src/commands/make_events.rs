use crate::error::SearchError;
use crate::event::{Event, Record};
use crate::permissions::{Action, Caller};
use crate::pipeline::expression::expand;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use clap::{ArgAction, Parser};
use serde_json::Value;

/// Event attributes may be literals or `$field` references resolved against each source record
#[derive(Debug, Parser)]
#[command(name = "make_events", about = "Generate events from the current result set")]
struct MakeEventsArgs {
    #[arg(short = 'i', long = "index", default_value = "default")]
    index: String,

    #[arg(short = 'o', long = "host", default_value = "127.0.0.1")]
    host: String,

    #[arg(short = 's', long = "source", default_value = "events")]
    source: String,

    #[arg(short = 't', long = "sourcetype", default_value = "json")]
    sourcetype: String,

    /// Persist the generated events
    #[arg(short = 'S', long = "save")]
    save: bool,

    /// Field to leave out of the generated events (repeatable)
    #[arg(short = 'd', long = "drop", action = ArgAction::Append, value_name = "FIELD")]
    drop: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<MakeEventsArgs>("make_events", run)
}

impl MakeEventsArgs {
    fn build(&self, source: Record, username: &str) -> Event {
        let fields: Record = source
            .iter()
            .filter(|(key, _)| !self.drop.contains(key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut event = Event::new(
            expand(&self.index, &source),
            expand(&self.host, &source),
            expand(&self.source, &source),
            expand(&self.sourcetype, &source),
            Value::Object(fields.clone()).to_string(),
        );
        event.extracted_fields = fields;
        event.user = Some(username.to_string());
        event
    }
}

fn run(
    engine: &Engine,
    caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = MakeEventsArgs::try_parse_from(argv)?;
    engine.require(caller, Action::Add)?;

    let store = engine.store().clone();
    let serializer = engine.serializer().clone();
    let username = caller.username.clone();
    let stream = input.into_stream()?.map_records(move |source| {
        let mut event = args.build(source, &username);
        if args.save {
            event = store.insert(event)?;
            tracing::debug!(id = ?event.id, "saved generated event");
        }
        serializer.serialize(&event)
    });
    Ok(ResultSet::Stream(stream))
}
