use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use composer_cache::{CacheStore, Clock, InMemoryCacheStore, SystemClock};
use composer_config::ApplicationDef;
use composer_engine::{Engine, EngineConfig, RunOutcome};
use composer_graph::{Application, ComponentRef};
use composer_registry::{ComponentTypeRegistry, DisconnectedDispatcher, LOCAL_ISOLATE, Services};

/// Composer - runs wired component graphs with fall-back, caching and
/// failure containment
#[derive(Parser)]
#[command(name = "composer")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Load an application file and report what was found
  Validate {
    /// Path to the application file (JSON)
    application_file: PathBuf,
  },

  /// Show which components are placed on which isolate
  Isolates {
    /// Path to the application file (JSON)
    application_file: PathBuf,
  },

  /// Run an application once with a payload read from stdin
  Run {
    /// Path to the application file (JSON)
    application_file: PathBuf,

    /// Start at this component (`composite.name`) instead of the entry point
    #[arg(long)]
    entry: Option<String>,

    /// Isolate hosted by this process; components elsewhere are dispatched
    #[arg(long)]
    local_isolate: Option<String>,

    /// Pre-populate a cache entry: CHANNEL/ENTRY=JSON
    #[arg(long, value_parser = parse_seed)]
    seed: Vec<Seed>,

    /// Push a value onto a queue channel: CHANNEL=JSON
    #[arg(long, value_parser = parse_enqueue)]
    enqueue: Vec<Enqueue>,

    /// Maximum steps kept in the trace (0 for unbounded)
    #[arg(long, default_value_t = composer_engine::DEFAULT_TRACE_CAPACITY)]
    trace_capacity: usize,
  },
}

#[derive(Debug, Clone)]
struct Seed {
  channel: String,
  entry: String,
  value: serde_json::Value,
}

#[derive(Debug, Clone)]
struct Enqueue {
  channel: String,
  value: serde_json::Value,
}

fn parse_seed(arg: &str) -> Result<Seed, String> {
  let (target, json) = arg
    .split_once('=')
    .ok_or("expected CHANNEL/ENTRY=JSON")?;
  let (channel, entry) = target
    .split_once('/')
    .ok_or("expected CHANNEL/ENTRY before '='")?;
  let value = serde_json::from_str(json).map_err(|e| format!("invalid JSON value: {}", e))?;
  Ok(Seed {
    channel: channel.to_string(),
    entry: entry.to_string(),
    value,
  })
}

fn parse_enqueue(arg: &str) -> Result<Enqueue, String> {
  let (channel, json) = arg.split_once('=').ok_or("expected CHANNEL=JSON")?;
  let value = serde_json::from_str(json).map_err(|e| format!("invalid JSON value: {}", e))?;
  Ok(Enqueue {
    channel: channel.to_string(),
    value,
  })
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  match cli.command {
    Some(Commands::Validate { application_file }) => validate(&application_file),
    Some(Commands::Isolates { application_file }) => isolates(&application_file),
    Some(Commands::Run {
      application_file,
      entry,
      local_isolate,
      seed,
      enqueue,
      trace_capacity,
    }) => {
      let config = EngineConfig {
        local_isolate,
        trace_capacity,
      };
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run(&application_file, entry, config, seed, enqueue).await })
    }
    None => {
      println!("composer - use --help to see available commands");
      Ok(())
    }
  }
}

fn read_definition(path: &Path) -> Result<ApplicationDef> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read application file: {}", path.display()))?;
  ApplicationDef::from_json(&content)
    .with_context(|| format!("failed to parse application file: {}", path.display()))
}

fn load(path: &Path) -> Result<Application> {
  let def = read_definition(path)?;
  let registry = ComponentTypeRegistry::with_builtins(&Services::in_memory());
  Application::load(def, &registry)
    .with_context(|| format!("invalid application: {}", path.display()))
}

fn validate(path: &Path) -> Result<()> {
  let app = load(path)?;
  println!(
    "{}: {} components in {} composites, entry {}",
    app.name(),
    app.len(),
    app.composites().len(),
    app.entry().reference
  );
  Ok(())
}

fn isolates(path: &Path) -> Result<()> {
  let app = load(path)?;
  for isolate in app.isolates() {
    println!("{}", isolate);
    for component in app.components_on(isolate) {
      println!("  {} ({})", component.reference, component.component_type);
    }
  }

  let unplaced: Vec<_> = app.components().filter(|c| c.isolate.is_none()).collect();
  if !unplaced.is_empty() {
    println!("{} (unplaced)", LOCAL_ISOLATE);
    for component in unplaced {
      println!("  {} ({})", component.reference, component.component_type);
    }
  }
  Ok(())
}

async fn run(
  path: &Path,
  entry: Option<String>,
  config: EngineConfig,
  seeds: Vec<Seed>,
  queued: Vec<Enqueue>,
) -> Result<()> {
  let cache = Arc::new(InMemoryCacheStore::new());
  let clock = Arc::new(SystemClock);
  for seed in seeds {
    cache
      .put(&seed.channel, &seed.entry, seed.value, clock.now_millis())
      .await;
  }
  for item in queued {
    cache.enqueue(&item.channel, item.value).await;
  }

  let services = Services::new(cache, clock, Arc::new(DisconnectedDispatcher));
  let engine = Engine::new(config, services);
  let app = engine
    .load(read_definition(path)?)
    .with_context(|| format!("invalid application: {}", path.display()))?;

  let entry = match entry {
    Some(entry) => ComponentRef::parse(&entry)
      .with_context(|| format!("entry '{}' is not of the form composite.name", entry))?,
    None => app.entry().reference.clone(),
  };

  let payload = read_payload_from_stdin()?;
  info!(application = %app.name(), entry = %entry, "running application");

  let report = engine
    .run(&app, &entry, payload, CancellationToken::new())
    .await
    .context("run could not start")?;

  println!("{}", serde_json::to_string_pretty(&report)?);

  if let RunOutcome::Failure { cause, .. } = &report.outcome {
    bail!("run {} failed: {}", report.run_id, cause);
  }
  Ok(())
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::json!({}));
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read payload from stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
  }
}
