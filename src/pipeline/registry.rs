use crate::error::SearchError;
use crate::permissions::Caller;
use crate::pipeline::environment::Environment;
use crate::pipeline::executor::Engine;
use crate::pipeline::result_set::ResultSet;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Uniform signature every search command implements
pub type Handler = Arc<
    dyn Fn(&Engine, &Caller, ResultSet, &[String], &mut Environment) -> Result<ResultSet, SearchError>
        + Send
        + Sync,
>;

/// A named command: argument spec plus handler
#[derive(Clone)]
pub struct Command {
    name: String,
    spec: clap::Command,
    handler: Handler,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Command {
    pub fn new<F>(name: impl Into<String>, spec: clap::Command, handler: F) -> Self
    where
        F: Fn(&Engine, &Caller, ResultSet, &[String], &mut Environment) -> Result<ResultSet, SearchError>
            + Send
            + Sync
            + 'static,
    {
        Command {
            name: name.into(),
            spec,
            handler: Arc::new(handler),
        }
    }

    /// Use a derived clap parser as the argument spec
    pub fn from_parser<A: clap::CommandFactory>(
        name: impl Into<String>,
        handler: impl Fn(&Engine, &Caller, ResultSet, &[String], &mut Environment) -> Result<ResultSet, SearchError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self::new(name, A::command(), handler)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same implementation exposed under another name
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn spec(&self) -> &clap::Command {
        &self.spec
    }

    pub fn about(&self) -> Option<String> {
        self.spec.get_about().map(|about| about.to_string())
    }

    /// Check argv (command name first) against the argument spec
    pub fn validate(&self, argv: &[String]) -> Result<(), SearchError> {
        self.spec.clone().try_get_matches_from(argv)?;
        Ok(())
    }

    pub fn invoke(
        &self,
        engine: &Engine,
        caller: &Caller,
        input: ResultSet,
        argv: &[String],
        env: &mut Environment,
    ) -> Result<ResultSet, SearchError> {
        (self.handler)(engine, caller, input, argv, env)
    }
}

/// Name to command mapping. Names are unique.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: IndexMap<String, Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every builtin under its own name
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for command in crate::commands::builtins() {
            registry.commands.insert(command.name().to_string(), command);
        }
        registry
    }

    /// Populate from a map of exposed name to builtin implementation id
    pub fn from_config(commands: &IndexMap<String, String>) -> Result<Self, SearchError> {
        let builtins = Self::builtin();
        let mut registry = Self::new();
        for (name, id) in commands {
            let command = builtins
                .lookup(id)
                .ok_or_else(|| SearchError::Config(format!("unknown builtin command '{}'", id)))?;
            registry.register(command.clone().renamed(name.as_str()))?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, command: Command) -> Result<(), SearchError> {
        if self.commands.contains_key(command.name()) {
            return Err(SearchError::DuplicateCommand(command.name().to_string()));
        }
        tracing::debug!(command = command.name(), "registered search command");
        self.commands.insert(command.name().to_string(), command);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> Command {
        Command::new(name, clap::Command::new("noop"), |_, _, input, _, _| Ok(input))
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = CommandRegistry::new();
        registry.register(noop("a")).unwrap();
        assert!(matches!(
            registry.register(noop("a")),
            Err(SearchError::DuplicateCommand(name)) if name == "a"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_from_config_renames_and_rejects_unknown() {
        let mut map = IndexMap::new();
        map.insert("find".to_string(), "search".to_string());
        map.insert("rn".to_string(), "rename".to_string());
        let registry = CommandRegistry::from_config(&map).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["find", "rn"]);
        assert!(registry.lookup("search").is_none());

        map.insert("bogus".to_string(), "no_such_command".to_string());
        assert!(matches!(CommandRegistry::from_config(&map), Err(SearchError::Config(_))));
    }

    #[derive(Debug, clap::Parser)]
    #[command(name = "greet", about = "Say hello")]
    struct GreetArgs {
        #[arg(short = 'n', long = "name")]
        name: String,
    }

    fn greet(
        _engine: &Engine,
        _caller: &Caller,
        input: ResultSet,
        _argv: &[String],
        _env: &mut Environment,
    ) -> Result<ResultSet, SearchError> {
        Ok(input)
    }

    #[test]
    fn test_from_parser_takes_spec_from_derive() {
        let command = Command::from_parser::<GreetArgs>("hello", greet);
        assert_eq!(command.name(), "hello");
        assert_eq!(command.about().as_deref(), Some("Say hello"));

        let ok: Vec<String> = ["hello", "-n", "bob"].iter().map(|s| s.to_string()).collect();
        assert!(command.validate(&ok).is_ok());
        let missing: Vec<String> = vec!["hello".to_string()];
        assert!(matches!(command.validate(&missing), Err(SearchError::InvalidArguments(_))));
    }

    #[test]
    fn test_validate_uses_argument_spec() {
        let registry = CommandRegistry::builtin();
        let rename = registry.lookup("rename").unwrap();
        let ok: Vec<String> = ["rename", "-f", "a", "-t", "b"].iter().map(|s| s.to_string()).collect();
        assert!(rename.validate(&ok).is_ok());
        let bad: Vec<String> = ["rename", "--bogus"].iter().map(|s| s.to_string()).collect();
        assert!(matches!(rename.validate(&bad), Err(SearchError::InvalidArguments(_))));
    }
}
