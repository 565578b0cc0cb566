//! The search pipeline: query parsing, command dispatch, stage execution and result normalization

pub mod environment;
pub mod executor;
pub mod expression;
pub mod parser;
pub mod registry;
pub mod resolve;
pub mod result_set;
pub mod stream;

pub use environment::Environment;
pub use executor::{Engine, Output};
pub use expression::{expand, generate_keyword_args, parse_field_expressions, render, FieldExpression, Lookup};
pub use parser::{parse, split_stages, Pipeline, Stage};
pub use registry::{Command, CommandRegistry, Handler};
pub use resolve::{normalize, resolve};
pub use result_set::ResultSet;
pub use stream::{RecordResult, RecordStream};
