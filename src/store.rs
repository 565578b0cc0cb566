//! Storage collaborator: the narrow contract the pipeline needs from a backing store,
//! the deferred query handle built on it, and an in-memory reference store.

use crate::error::{SearchError, StoreError};
use crate::event::{display_value, Event, Record};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

/// Comparison applied by a field predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOp {
    Eq,
    Ne,
}

/// Right-hand side of a field predicate
#[derive(Debug, Clone)]
pub enum Pattern {
    Exact(String),
    Wildcard(Regex),
}

impl Pattern {
    /// `*` matches any run of characters; everything else is literal
    pub fn parse(text: &str) -> Self {
        if !text.contains('*') {
            return Pattern::Exact(text.to_string());
        }
        let escaped: Vec<String> = text.split('*').map(regex::escape).collect();
        let source = format!("^{}$", escaped.join(".*"));
        match Regex::new(&source) {
            Ok(re) => Pattern::Wildcard(re),
            Err(_) => Pattern::Exact(text.to_string()),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Pattern::Exact(expected) => expected == text,
            Pattern::Wildcard(re) => re.is_match(text),
        }
    }
}

/// `field=value` / `field!=value`
#[derive(Debug, Clone)]
pub struct Predicate {
    pub field: String,
    pub op: PredicateOp,
    pub pattern: Pattern,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: PredicateOp, value: &str) -> Self {
        Predicate {
            field: field.into(),
            op,
            pattern: Pattern::parse(value),
        }
    }

    /// Match against a resolved field value; array fields match when any element does
    pub fn matches_value(&self, value: Option<&Value>) -> bool {
        let hit = match value {
            None => false,
            Some(Value::Array(items)) => items.iter().any(|v| self.pattern.matches(&display_value(v))),
            Some(v) => self.pattern.matches(&display_value(v)),
        };
        match self.op {
            PredicateOp::Eq => hit,
            PredicateOp::Ne => !hit,
        }
    }

    pub fn matches_event(&self, event: &Event) -> bool {
        self.matches_value(event.field(&self.field).as_ref())
    }
}

/// Sort key pushed down to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// Specification of a deferred query against the backing store
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub predicates: Vec<Predicate>,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl QuerySpec {
    pub fn matches(&self, event: &Event) -> bool {
        if self.earliest.is_some_and(|earliest| event.created < earliest) {
            return false;
        }
        if self.latest.is_some_and(|latest| event.created > latest) {
            return false;
        }
        self.predicates.iter().all(|p| p.matches_event(event))
    }

    /// Apply predicates, ordering and limit to a slice of events in natural order
    pub fn select<'a>(&self, events: &'a [Event]) -> Vec<&'a Event> {
        let mut selected: Vec<&Event> = events.iter().filter(|e| self.matches(e)).collect();
        if !self.order_by.is_empty() {
            selected.sort_by(|a, b| {
                for key in &self.order_by {
                    let ordering = compare_values(a.field(&key.field).as_ref(), b.field(&key.field).as_ref());
                    let ordering = if key.descending { ordering.reverse() } else { ordering };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Total order over optional JSON values: missing < null < bool < number < string < other
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(_) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x @ Value::Array(_)), Some(y @ Value::Array(_)))
        | (Some(x @ Value::Object(_)), Some(y @ Value::Object(_))) => x.to_string().cmp(&y.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// The contract the pipeline consumes from a backing store
pub trait EventStore: Send + Sync {
    /// Entity type name used for permission checks
    fn entity_type(&self) -> &str;

    /// Materialize matching events in store order (or the query's ordering)
    fn fetch(&self, query: &QuerySpec) -> Result<Vec<Event>, StoreError>;

    fn count(&self, query: &QuerySpec) -> Result<usize, StoreError> {
        Ok(self.fetch(query)?.len())
    }

    /// Apply every assignment to every matching event, atomically; returns affected rows
    fn update(&self, query: &QuerySpec, changes: &Record) -> Result<usize, StoreError>;

    fn delete(&self, query: &QuerySpec) -> Result<usize, StoreError>;

    /// Persist a new event and return it with its assigned id
    fn insert(&self, event: Event) -> Result<Event, StoreError>;
}

/// A deferred result set: a query specification bound to a store, not yet materialized
#[derive(Clone)]
pub struct Deferred {
    store: Arc<dyn EventStore>,
    spec: QuerySpec,
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("entity", &self.store.entity_type())
            .field("spec", &self.spec)
            .finish()
    }
}

impl Deferred {
    /// Every stored event, in natural order
    pub fn all(store: Arc<dyn EventStore>) -> Self {
        Deferred {
            store,
            spec: QuerySpec::default(),
        }
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn entity_type(&self) -> &str {
        self.store.entity_type()
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.spec.predicates.push(predicate);
        self
    }

    /// Narrow the time window; repeated calls intersect, never widen
    pub fn between(mut self, earliest: Option<DateTime<Utc>>, latest: Option<DateTime<Utc>>) -> Self {
        self.spec.earliest = self.spec.earliest.max(earliest);
        self.spec.latest = match (self.spec.latest, latest) {
            (Some(current), Some(new)) => Some(current.min(new)),
            (current, new) => current.or(new),
        };
        self
    }

    pub fn order_by(mut self, keys: Vec<OrderBy>) -> Self {
        self.spec.order_by = keys;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.spec.limit = Some(self.spec.limit.map_or(limit, |current| current.min(limit)));
        self
    }

    pub fn count(&self) -> Result<usize, SearchError> {
        Ok(self.store.count(&self.spec)?)
    }

    pub fn last(&self) -> Result<Option<Record>, SearchError> {
        let mut events = self.store.fetch(&self.spec)?;
        Ok(events.pop().map(|e| e.to_record()))
    }

    pub fn update(&self, changes: &Record) -> Result<usize, SearchError> {
        Ok(self.store.update(&self.spec, changes)?)
    }

    pub fn delete(&self) -> Result<usize, SearchError> {
        Ok(self.store.delete(&self.spec)?)
    }

    pub fn to_records(&self) -> Result<Vec<Record>, SearchError> {
        Ok(self
            .store
            .fetch(&self.spec)?
            .iter()
            .map(Event::to_record)
            .collect())
    }
}

/// Reference store keeping events in memory, optionally backed by a JSON Lines file
#[derive(Debug)]
pub struct MemoryStore {
    entity: String,
    events: RwLock<Vec<Event>>,
    next_id: AtomicU64,
    dirty: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            entity: "event".to_string(),
            events: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn with_events(events: impl IntoIterator<Item = Event>) -> Result<Self, SearchError> {
        let store = Self::new();
        for event in events {
            store.insert(event)?;
        }
        store.dirty.store(false, AtomicOrdering::SeqCst);
        Ok(store)
    }

    /// Load events from a JSON Lines file; a missing file yields an empty store
    pub fn open_jsonl(path: &Path) -> Result<Self, SearchError> {
        let store = Self::new();
        if !path.exists() {
            return Ok(store);
        }
        let reader = BufReader::new(File::open(path)?);
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line).map_err(|e| {
                StoreError::Backend(format!("{}:{}: {}", path.display(), number + 1, e))
            })?;
            store.insert(event).map_err(|e| {
                StoreError::Backend(format!("{}:{}: {}", path.display(), number + 1, e))
            })?;
        }
        store.dirty.store(false, AtomicOrdering::SeqCst);
        tracing::debug!(path = %path.display(), events = store.len(), "loaded event file");
        Ok(store)
    }

    pub fn persist_jsonl(&self, path: &Path) -> Result<(), SearchError> {
        let events = self.read()?;
        let mut writer = BufWriter::new(File::create(path)?);
        for event in events.iter() {
            let line = serde_json::to_string(event).map_err(|e| StoreError::Backend(e.to_string()))?;
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        self.dirty.store(false, AtomicOrdering::SeqCst);
        Ok(())
    }

    /// True when events were inserted, updated or deleted since load/persist
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(AtomicOrdering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.read().map(|events| events.clone()).unwrap_or_default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Event>>, StoreError> {
        self.events
            .read()
            .map_err(|_| StoreError::Backend("event lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Event>>, StoreError> {
        self.events
            .write()
            .map_err(|_| StoreError::Backend("event lock poisoned".to_string()))
    }
}

impl EventStore for MemoryStore {
    fn entity_type(&self) -> &str {
        &self.entity
    }

    fn fetch(&self, query: &QuerySpec) -> Result<Vec<Event>, StoreError> {
        let events = self.read()?;
        Ok(query.select(&events).into_iter().cloned().collect())
    }

    fn count(&self, query: &QuerySpec) -> Result<usize, StoreError> {
        let events = self.read()?;
        Ok(query.select(&events).len())
    }

    fn update(&self, query: &QuerySpec, changes: &Record) -> Result<usize, StoreError> {
        let mut events = self.write()?;
        let targets: Vec<usize> = {
            let selected = query.select(&events);
            events
                .iter()
                .enumerate()
                .filter(|(_, e)| selected.iter().any(|s| std::ptr::eq(*s, *e)))
                .map(|(i, _)| i)
                .collect()
        };

        // Validate every assignment on copies before touching stored events
        let mut updated = Vec::with_capacity(targets.len());
        for &i in &targets {
            let mut event = events[i].clone();
            for (field, value) in changes {
                event.set_field(field, value)?;
            }
            updated.push((i, event));
        }

        let affected = updated.len();
        for (i, event) in updated {
            events[i] = event;
        }
        if affected > 0 {
            self.dirty.store(true, AtomicOrdering::SeqCst);
        }
        tracing::debug!(affected, "bulk update applied");
        Ok(affected)
    }

    fn delete(&self, query: &QuerySpec) -> Result<usize, StoreError> {
        let mut events = self.write()?;
        let doomed: Vec<bool> = {
            let selected = query.select(&events);
            events
                .iter()
                .map(|e| selected.iter().any(|s| std::ptr::eq(*s, e)))
                .collect()
        };
        let mut flags = doomed.iter();
        events.retain(|_| !flags.next().copied().unwrap_or(false));
        let affected = doomed.iter().filter(|d| **d).count();
        if affected > 0 {
            self.dirty.store(true, AtomicOrdering::SeqCst);
        }
        tracing::debug!(affected, "bulk delete applied");
        Ok(affected)
    }

    fn insert(&self, mut event: Event) -> Result<Event, StoreError> {
        let mut events = self.write()?;
        match event.id {
            Some(id) => {
                if events.iter().any(|e| e.id == Some(id)) {
                    return Err(StoreError::InvalidValue {
                        field: "id".to_string(),
                        message: format!("duplicate id {}", id),
                    });
                }
                self.next_id.fetch_max(id + 1, AtomicOrdering::SeqCst);
            }
            None => event.id = Some(self.next_id.fetch_add(1, AtomicOrdering::SeqCst)),
        }
        events.push(event.clone());
        self.dirty.store(true, AtomicOrdering::SeqCst);
        Ok(event)
    }
}
