use crate::error::SearchError;
use crate::event::{record_field, Record};
use crate::permissions::Caller;
use crate::pipeline::expression::is_field_name;
use crate::pipeline::{Command, Engine, Environment, ResultSet};
use crate::store::{Deferred, Predicate, PredicateOp};
use chrono::{DateTime, Utc};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "search", about = "Select events matching field filters")]
struct SearchArgs {
    /// Only events created at or after this time
    #[arg(long, value_name = "TIME")]
    earliest: Option<String>,

    /// Only events created at or before this time
    #[arg(long, value_name = "TIME")]
    latest: Option<String>,

    /// Only events created within this long ago, e.g. `15m` or `2h`
    #[arg(long, value_name = "DURATION")]
    since: Option<String>,

    /// `field=value` or `field!=value`; `*` matches any run of characters
    #[arg(value_name = "FILTER")]
    filters: Vec<String>,
}

pub fn command() -> Command {
    Command::from_parser::<SearchArgs>("search", run)
}

/// Parse one `field=value` / `field!=value` filter token
pub fn parse_filter(token: &str) -> Result<Predicate, SearchError> {
    let invalid = || {
        SearchError::invalid(format!(
            "invalid search filter '{}': expected field=value or field!=value",
            token
        ))
    };

    let eq = token.find('=').ok_or_else(invalid)?;
    let (field, op) = match token[..eq].strip_suffix('!') {
        Some(field) => (field, PredicateOp::Ne),
        None => (&token[..eq], PredicateOp::Eq),
    };
    if !is_field_name(field) {
        return Err(invalid());
    }
    Ok(Predicate::new(field, op, &token[eq + 1..]))
}

fn parse_time(flag: &str, text: &str) -> Result<DateTime<Utc>, SearchError> {
    dateparser::parse(text)
        .map_err(|e| SearchError::invalid(format!("invalid --{} '{}': {}", flag, text, e)))
}

fn parse_since(text: &str) -> Result<DateTime<Utc>, SearchError> {
    let invalid = |e: String| SearchError::invalid(format!("invalid --since '{}': {}", text, e));
    let duration = humantime::parse_duration(text).map_err(|e| invalid(e.to_string()))?;
    let duration = chrono::Duration::from_std(duration).map_err(|e| invalid(e.to_string()))?;
    Ok(Utc::now() - duration)
}

fn record_created(record: &Record) -> Option<DateTime<Utc>> {
    let text = record_field(record, "created")?.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn refine(
    deferred: Deferred,
    predicates: &[Predicate],
    earliest: Option<DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
) -> ResultSet {
    tracing::debug!(filters = predicates.len(), "search pushed down to store");
    let deferred = predicates
        .iter()
        .cloned()
        .fold(deferred, |d, predicate| d.filter(predicate));
    ResultSet::Deferred(deferred.between(earliest, latest))
}

fn run(
    engine: &Engine,
    _caller: &Caller,
    input: ResultSet,
    argv: &[String],
    _env: &mut Environment,
) -> Result<ResultSet, SearchError> {
    let args = SearchArgs::try_parse_from(argv)?;
    let predicates = args
        .filters
        .iter()
        .map(|token| parse_filter(token))
        .collect::<Result<Vec<_>, _>>()?;

    let mut earliest = args
        .earliest
        .as_deref()
        .map(|t| parse_time("earliest", t))
        .transpose()?;
    if let Some(since) = args.since.as_deref().map(parse_since).transpose()? {
        earliest = Some(earliest.map_or(since, |e| e.max(since)));
    }
    let latest = args
        .latest
        .as_deref()
        .map(|t| parse_time("latest", t))
        .transpose()?;

    match input {
        ResultSet::Empty => Ok(refine(
            Deferred::all(engine.store().clone()),
            &predicates,
            earliest,
            latest,
        )),
        ResultSet::Deferred(deferred) if deferred.spec().limit.is_none() => Ok(refine(deferred, &predicates, earliest, latest)),
        other => {
            let stream = other.into_stream()?.filter_records(move |record| {
                let in_range = if earliest.is_none() && latest.is_none() {
                    true
                } else {
                    record_created(record).is_some_and(|created| {
                        earliest.map_or(true, |e| created >= e) && latest.map_or(true, |l| created <= l)
                    })
                };
                Ok(in_range
                    && predicates
                        .iter()
                        .all(|p| p.matches_value(record_field(record, &p.field))))
            });
            Ok(ResultSet::Stream(stream))
        }
    }
}
