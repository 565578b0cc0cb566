use crate::error::SearchError;
use crate::event::Record;
use std::fmt;

pub type RecordResult = Result<Record, SearchError>;

/// Lazy, finite, single-pass sequence of records produced by a stage.
/// Nothing runs until the stream is pulled; once drained it cannot be restarted.
pub struct RecordStream {
    inner: Box<dyn Iterator<Item = RecordResult>>,
    failed: bool,
}

impl RecordStream {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = RecordResult> + 'static,
    {
        RecordStream {
            inner: Box::new(iter),
            failed: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        Self::new(records.into_iter().map(Ok))
    }

    /// Drain the stream; the first error aborts
    pub fn materialize(self) -> Result<Vec<Record>, SearchError> {
        self.collect()
    }

    pub fn map_records<F>(self, mut f: F) -> Self
    where
        F: FnMut(Record) -> RecordResult + 'static,
    {
        Self::new(self.map(move |item| item.and_then(&mut f)))
    }

    pub fn filter_records<F>(self, mut keep: F) -> Self
    where
        F: FnMut(&Record) -> Result<bool, SearchError> + 'static,
    {
        Self::new(self.filter_map(move |item| match item {
            Ok(record) => match keep(&record) {
                Ok(true) => Some(Ok(record)),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            },
            Err(e) => Some(Err(e)),
        }))
    }

    /// Stop after `n` records without pulling the rest of the upstream
    pub fn limit(self, n: usize) -> Self {
        Self::new(self.take(n))
    }

    pub fn chain(self, records: Vec<Record>) -> Self {
        Self::new(Iterator::chain(self, records.into_iter().map(Ok)))
    }

    /// Attach the producing stage to errors raised while this stream is drained later
    pub fn tagged(self, position: usize, command: &str) -> Self {
        let command = command.to_string();
        Self::new(self.map(move |item| {
            item.map_err(|e| match e {
                tagged @ SearchError::Stage { .. } => tagged,
                source => SearchError::Stage {
                    position,
                    command: command.clone(),
                    source: Box::new(source),
                },
            })
        }))
    }
}

impl Iterator for RecordStream {
    type Item = RecordResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.inner.next();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

impl fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStream")
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn numbered(n: i64) -> Record {
        json!({ "n": n }).as_object().cloned().unwrap()
    }

    #[test]
    fn test_limit_short_circuits_unbounded_source() {
        let pulled = Rc::new(Cell::new(0));
        let counter = pulled.clone();
        let stream = RecordStream::new((0..).map(move |i| {
            counter.set(counter.get() + 1);
            Ok(numbered(i))
        }));

        let records = stream.limit(3).materialize().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(pulled.get(), 3);
    }

    #[test]
    fn test_errors_stop_the_stream_and_keep_first_tag() {
        let stream = RecordStream::new((0..5).map(|i| {
            if i == 2 {
                Err(SearchError::missing_field("x"))
            } else {
                Ok(numbered(i))
            }
        }))
        .tagged(2, "rename")
        .map_records(Ok)
        .tagged(3, "select");

        let items: Vec<RecordResult> = stream.collect();
        assert_eq!(items.len(), 3);
        match items.last() {
            Some(Err(SearchError::Stage { position, command, .. })) => {
                assert_eq!(*position, 2);
                assert_eq!(command, "rename");
            }
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[test]
    fn test_filter_and_chain() {
        let stream = RecordStream::from_records((0..4).map(numbered).collect())
            .filter_records(|r| Ok(r["n"].as_i64().unwrap_or(0) % 2 == 0))
            .chain(vec![numbered(9)]);
        let ns: Vec<i64> = stream
            .materialize()
            .unwrap()
            .iter()
            .map(|r| r["n"].as_i64().unwrap())
            .collect();
        assert_eq!(ns, vec![0, 2, 9]);
    }
}
