use crate::error::{SearchError, StoreError};
use crate::event::{Event, Record};
use serde_json::Value;

/// Turns a stored event into the transmissible form handed back to callers
pub trait RecordSerializer: Send + Sync {
    fn serialize(&self, event: &Event) -> Result<Record, SearchError>;
}

/// Serde representation of [`Event`]
#[derive(Debug, Clone, Copy, Default)]
pub struct EventSerializer;

impl RecordSerializer for EventSerializer {
    fn serialize(&self, event: &Event) -> Result<Record, SearchError> {
        match serde_json::to_value(event) {
            Ok(Value::Object(record)) => Ok(record),
            Ok(_) => Err(StoreError::Backend("event did not serialize to a mapping".to_string()).into()),
            Err(e) => Err(StoreError::Backend(e.to_string()).into()),
        }
    }
}
