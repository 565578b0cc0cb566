use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use is_terminal::IsTerminal;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use delve::event::parse_literal;
use delve::logging;
use delve::output_format::{OutputFormat, OutputFormatter};
use delve::{Caller, Config, Engine, Environment, MemoryStore, PipelineError};

#[derive(Parser)]
#[command(name = "delve")]
#[command(about = "Search and transform stored events with a piped query language")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short = 'c', long = "config", env = "DELVE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Debug mode - log every dispatched stage to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query such as `search index=web | head 5`
    Search(SearchArgs),
    /// List the commands a query can use
    Commands,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(value_name = "QUERY")]
    query: String,

    /// JSON Lines event file (overrides the configured one)
    #[arg(short = 'd', long = "data")]
    data: Option<PathBuf>,

    /// Run the query as this user
    #[arg(short = 'u', long = "user")]
    user: Option<String>,

    /// Output format; table on a terminal, jsonl otherwise
    #[arg(short = 'F', long = "format", value_enum)]
    format: Option<OutputFormat>,

    /// Comma-separated list of fields to output
    #[arg(short = 'k', long = "keys", value_delimiter = ',')]
    keys: Option<Vec<String>>,

    /// Seed a query variable, usable as `$NAME`
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let json_errors = matches!(
        &cli.command,
        Commands::Search(SearchArgs {
            format: Some(OutputFormat::Json),
            ..
        })
    );

    if let Err(e) = run(cli) {
        // Pipeline errors already name their stage; print them without the source chain
        match e.downcast_ref::<PipelineError>() {
            Some(err) if json_errors => match serde_json::to_string(&err.report()) {
                Ok(report) => eprintln!("{}", report),
                Err(_) => eprintln!("delve: {}", err),
            },
            Some(err) => eprintln!("delve: {}", err),
            None => eprintln!("delve: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Commands => list_commands(&config),
        Commands::Search(args) => search(&config, args),
    }
}

fn list_commands(config: &Config) -> anyhow::Result<()> {
    let registry = config.registry()?;
    let width = registry.names().map(str::len).max().unwrap_or(0);
    let mut out = io::stdout().lock();
    for command in registry.iter() {
        writeln!(
            out,
            "{:<width$}  {}",
            command.name(),
            command.about().unwrap_or_default(),
            width = width
        )?;
    }
    Ok(())
}

fn search(config: &Config, args: SearchArgs) -> anyhow::Result<()> {
    let data = args.data.clone().or_else(|| config.data.clone());
    let store = Arc::new(match &data {
        Some(path) => MemoryStore::open_jsonl(path)
            .with_context(|| format!("failed to open event file '{}'", path.display()))?,
        None => MemoryStore::new(),
    });
    let engine = Engine::from_config(config, store.clone())?;

    let username = args
        .user
        .clone()
        .or_else(|| config.default_user.clone())
        .unwrap_or_else(|| Caller::anonymous().username);
    let caller = Caller::new(username);

    let mut env = Environment::for_caller(&caller);
    for assignment in &args.set {
        let Some((name, value)) = assignment.split_once('=') else {
            bail!("--set expects NAME=VALUE, got '{}'", assignment);
        };
        env.set(name.trim(), parse_literal(value));
    }

    let output = engine.execute(&args.query, &caller, &mut env)?;

    if let Some(path) = &data {
        if store.is_dirty() {
            store
                .persist_jsonl(path)
                .with_context(|| format!("failed to write event file '{}'", path.display()))?;
            tracing::debug!(path = %path.display(), events = store.len(), "persisted event file");
        }
    }

    let format = args.format.unwrap_or_else(|| {
        if io::stdout().is_terminal() {
            OutputFormat::Table
        } else {
            OutputFormat::Jsonl
        }
    });
    let formatter = OutputFormatter::new(format, args.keys);
    let mut out = io::BufWriter::new(io::stdout().lock());
    formatter.write_output(&mut out, &output)?;
    out.flush()?;
    Ok(())
}
