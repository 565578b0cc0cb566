use crate::error::SearchError;
use crate::event::Record;
use crate::pipeline::resolve::value_to_records;
use crate::pipeline::stream::RecordStream;
use crate::store::Deferred;
use serde_json::Value;

/// What flows between stages
#[derive(Debug)]
pub enum ResultSet {
    /// No stage has produced anything yet
    Empty,
    /// A query against the backing store, not yet materialized
    Deferred(Deferred),
    Materialized(Vec<Record>),
    Stream(RecordStream),
    /// Non-record output: a visualization descriptor, an affected-row count, a scalar
    Value(Value),
}

impl ResultSet {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResultSet::Empty => "empty",
            ResultSet::Deferred(_) => "deferred",
            ResultSet::Materialized(_) => "materialized",
            ResultSet::Stream(_) => "stream",
            ResultSet::Value(_) => "value",
        }
    }

    pub fn is_empty_input(&self) -> bool {
        matches!(self, ResultSet::Empty)
    }

    /// Narrow to the deferred variant or fail with a type mismatch naming `command`
    pub fn into_deferred(self, command: &str) -> Result<Deferred, SearchError> {
        match self {
            ResultSet::Deferred(deferred) => Ok(deferred),
            other => Err(SearchError::TypeMismatch {
                command: command.to_string(),
                expected: "deferred",
                found: other.kind_name(),
            }),
        }
    }

    /// View any input as a record stream. Deferred input is fetched here; streams pass through.
    pub fn into_stream(self) -> Result<RecordStream, SearchError> {
        match self {
            ResultSet::Empty => Ok(RecordStream::empty()),
            ResultSet::Deferred(deferred) => Ok(RecordStream::from_records(deferred.to_records()?)),
            ResultSet::Materialized(records) => Ok(RecordStream::from_records(records)),
            ResultSet::Stream(stream) => Ok(stream),
            ResultSet::Value(value) => Ok(RecordStream::from_records(value_to_records(value)?)),
        }
    }
}

impl From<Vec<Record>> for ResultSet {
    fn from(records: Vec<Record>) -> Self {
        ResultSet::Materialized(records)
    }
}

impl From<RecordStream> for ResultSet {
    fn from(stream: RecordStream) -> Self {
        ResultSet::Stream(stream)
    }
}

impl From<Deferred> for ResultSet {
    fn from(deferred: Deferred) -> Self {
        ResultSet::Deferred(deferred)
    }
}
