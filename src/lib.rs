// src/lib.rs
pub mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod flatten;
pub mod logging;
pub mod output_format;
pub mod permissions;
pub mod pipeline;
pub mod script;
pub mod serializer;
pub mod store;

pub use config::Config;
pub use error::*;
pub use event::{Event, Record};
pub use permissions::{Action, AllowAll, Caller, DenyAll, GrantTable, PermissionPolicy};
pub use pipeline::*;
pub use serializer::{EventSerializer, RecordSerializer};
pub use store::{Deferred, EventStore, MemoryStore, OrderBy, Predicate, PredicateOp, QuerySpec};
