use serde::Serialize;
use std::fmt;

/// Errors raised while splitting a query into stages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty query")]
    EmptyQuery,

    #[error("stage {position} is empty")]
    EmptyStage { position: usize },

    #[error("malformed quoting in stage {position}: {message}")]
    Quoting { position: usize, message: String },
}

/// Errors raised by the storage collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{0}' cannot be modified")]
    ReadOnlyField(String),

    #[error("invalid value for field '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Errors a single stage (or one of its collaborators) can raise
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("{0}")]
    InvalidArguments(String),

    #[error("command '{0}' is already registered")]
    DuplicateCommand(String),

    #[error("permission denied: {action} on {entity}")]
    PermissionDenied { action: String, entity: String },

    #[error("{command} expects {expected} input, received {found}")]
    TypeMismatch {
        command: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field '{field}' not found")]
    MissingField { field: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("expression '{expression}' failed: {message}")]
    Script { expression: String, message: String },

    #[error("subquery failed: {0}")]
    Subquery(Box<PipelineError>),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps an error raised while a lazy stream produced by an earlier stage was drained
    #[error("{source}")]
    Stage {
        position: usize,
        command: String,
        #[source]
        source: Box<SearchError>,
    },
}

impl From<clap::Error> for SearchError {
    fn from(err: clap::Error) -> Self {
        SearchError::InvalidArguments(err.to_string().trim_end().to_string())
    }
}

/// Coarse classification used by callers that render errors uniformly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    UnknownCommand,
    InvalidArguments,
    DuplicateCommand,
    Permission,
    TypeMismatch,
    Field,
    Storage,
    Script,
    Config,
    Io,
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::Parse(_) => ErrorKind::Parse,
            SearchError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            SearchError::InvalidArguments(_) => ErrorKind::InvalidArguments,
            SearchError::DuplicateCommand(_) => ErrorKind::DuplicateCommand,
            SearchError::PermissionDenied { .. } => ErrorKind::Permission,
            SearchError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            SearchError::MissingField { .. } => ErrorKind::Field,
            SearchError::Store(_) => ErrorKind::Storage,
            SearchError::Script { .. } => ErrorKind::Script,
            SearchError::Subquery(inner) => inner.kind(),
            SearchError::Config(_) => ErrorKind::Config,
            SearchError::Io(_) => ErrorKind::Io,
            SearchError::Stage { source, .. } => source.kind(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        SearchError::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        SearchError::InvalidArguments(message.into())
    }
}

/// Identifies the stage an error was raised in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRef {
    pub position: usize,
    pub command: String,
}

impl fmt::Display for StageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.position, self.command)
    }
}

/// Structured error returned from a pipeline run: kind, stage and message
#[derive(Debug)]
pub struct PipelineError {
    pub stage: Option<StageRef>,
    pub source: SearchError,
}

impl PipelineError {
    pub fn new(stage: Option<StageRef>, source: SearchError) -> Self {
        // Errors tagged by a lazy stream carry the stage that actually produced them.
        match source {
            SearchError::Stage {
                position,
                command,
                source,
            } => PipelineError {
                stage: Some(StageRef { position, command }),
                source: *source,
            },
            source => PipelineError { stage, source },
        }
    }

    pub fn at(position: usize, command: &str, source: SearchError) -> Self {
        Self::new(
            Some(StageRef {
                position,
                command: command.to_string(),
            }),
            source,
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            stage: self.stage.as_ref().map(|s| s.position),
            command: self.stage.as_ref().map(|s| s.command.clone()),
            message: self.source.to_string(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stage {
            Some(stage) => write!(f, "{}: {}", stage, self.source),
            None => write!(f, "{}", self.source),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Serializable form of a [`PipelineError`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub stage: Option<usize>,
    pub command: Option<String>,
    pub message: String,
}
