use crate::config::Config;
use crate::error::{ParseError, PipelineError, SearchError, StageRef};
use crate::event::Record;
use crate::permissions::{self, Action, AllowAll, Caller, PermissionPolicy};
use crate::pipeline::environment::Environment;
use crate::pipeline::expression::render;
use crate::pipeline::parser::{parse, Pipeline, Stage};
use crate::pipeline::registry::CommandRegistry;
use crate::pipeline::resolve::{resolve, value_to_records};
use crate::pipeline::result_set::ResultSet;
use crate::serializer::{EventSerializer, RecordSerializer};
use crate::store::EventStore;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Realized result of a query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Output {
    Records(Vec<Record>),
    Value(Value),
}

impl Output {
    pub fn as_records(&self) -> Option<&[Record]> {
        match self {
            Output::Records(records) => Some(records),
            Output::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Output::Value(value) => Some(value),
            Output::Records(_) => None,
        }
    }

    /// Records, converting an object or array-of-objects value
    pub fn into_records(self) -> Result<Vec<Record>, SearchError> {
        match self {
            Output::Records(records) => Ok(records),
            Output::Value(value) => value_to_records(value),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Output::Records(records) => Value::Array(records.into_iter().map(Value::Object).collect()),
            Output::Value(value) => value,
        }
    }
}

/// Process-wide context queries run against: commands plus the store, permission and serialization collaborators
#[derive(Clone)]
pub struct Engine {
    registry: Arc<CommandRegistry>,
    store: Arc<dyn EventStore>,
    permissions: Arc<dyn PermissionPolicy>,
    serializer: Arc<dyn RecordSerializer>,
}

impl Engine {
    pub fn new(registry: CommandRegistry, store: Arc<dyn EventStore>) -> Self {
        Engine {
            registry: Arc::new(registry),
            store,
            permissions: Arc::new(AllowAll),
            serializer: Arc::new(EventSerializer),
        }
    }

    /// Registry and permission policy from configuration, over the given store
    pub fn from_config(config: &Config, store: Arc<dyn EventStore>) -> Result<Self, SearchError> {
        Ok(Engine::new(config.registry()?, store).with_permissions(config.permission_policy()))
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionPolicy>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn RecordSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn serializer(&self) -> &Arc<dyn RecordSerializer> {
        &self.serializer
    }

    pub fn permissions(&self) -> &dyn PermissionPolicy {
        self.permissions.as_ref()
    }

    /// Permission gate for commands that mutate the store
    pub fn require(&self, caller: &Caller, action: Action) -> Result<(), SearchError> {
        permissions::require(self.permissions.as_ref(), action, self.store.entity_type(), caller)
    }

    /// Run a query to completion. Any stage error aborts the whole pipeline.
    pub fn execute(
        &self,
        query: &str,
        caller: &Caller,
        env: &mut Environment,
    ) -> Result<Output, PipelineError> {
        if query.trim().is_empty() {
            return Ok(Output::Records(Vec::new()));
        }
        let pipeline = parse(query).map_err(|e| PipelineError::new(None, e.into()))?;
        tracing::debug!(stages = pipeline.len(), user = %caller.username, "executing query");

        let result = self.run(&pipeline, caller, env)?;
        let last = pipeline.stages.last().map(|stage| StageRef {
            position: stage.position,
            command: stage.command.clone(),
        });
        finalize(result).map_err(|e| PipelineError::new(last, e))
    }

    /// Run every stage without realizing the final result
    pub fn run(
        &self,
        pipeline: &Pipeline,
        caller: &Caller,
        env: &mut Environment,
    ) -> Result<ResultSet, PipelineError> {
        let mut current = ResultSet::Empty;
        for stage in pipeline.iter() {
            current = self
                .run_stage(stage, caller, current, env)
                .map_err(|e| PipelineError::at(stage.position, &stage.command, e))?;
        }
        Ok(current)
    }

    fn run_stage(
        &self,
        stage: &Stage,
        caller: &Caller,
        input: ResultSet,
        env: &mut Environment,
    ) -> Result<ResultSet, SearchError> {
        let rendered = render(&stage.arguments, env);
        let mut argv = vec![stage.command.clone()];
        argv.extend(shell_words::split(&rendered).map_err(|e| ParseError::Quoting {
            position: stage.position,
            message: e.to_string(),
        })?);

        let command = self
            .registry
            .lookup(&stage.command)
            .ok_or_else(|| SearchError::UnknownCommand(stage.command.clone()))?;
        command.validate(&argv)?;

        tracing::debug!(
            position = stage.position,
            command = %stage.command,
            input = input.kind_name(),
            args = ?&argv[1..],
            "dispatching stage"
        );
        let output = command.invoke(self, caller, input, &argv, env)?;

        Ok(match output {
            ResultSet::Stream(stream) => ResultSet::Stream(stream.tagged(stage.position, &stage.command)),
            other => other,
        })
    }

    /// Nested pipeline sharing the caller and environment
    pub fn run_subquery(
        &self,
        query: &str,
        caller: &Caller,
        env: &mut Environment,
    ) -> Result<Vec<Record>, SearchError> {
        self.execute(query, caller, env)
            .map_err(|e| SearchError::Subquery(Box::new(e)))?
            .into_records()
    }
}

fn finalize(result: ResultSet) -> Result<Output, SearchError> {
    Ok(match result {
        ResultSet::Empty => Output::Records(Vec::new()),
        ResultSet::Deferred(deferred) => Output::Records(resolve(ResultSet::Deferred(deferred))?),
        ResultSet::Materialized(records) => Output::Records(records),
        ResultSet::Stream(stream) => Output::Records(stream.materialize()?),
        ResultSet::Value(value) => Output::Value(value),
    })
}
