//! Entwine CLI: run one action against a fixture-seeded in-memory store.
//!
//! Usage:
//!   entwine run --action '<json>' [--fixtures path] [--config path]
//!   entwine show-config [--config path]

use clap::{Parser, Subcommand};
use entwine::{ActionDescriptor, CrudConfig, CrudService, Dispatcher, Fixture, MemoryStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "entwine",
    version,
    about = "Declarative record-graph enrichment and cascade engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to a YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch one action and print the JSON response
    Run {
        /// Action descriptor as JSON, or @path to a JSON file
        #[arg(long)]
        action: String,
        /// JSON array of fixtures ({zone?, base?, name?, records}) to seed the store
        #[arg(long)]
        fixtures: Option<PathBuf>,
    },
    /// Print the effective configuration as YAML
    ShowConfig,
}

/// Explicit path, else `<config_dir>/entwine/config.yaml` when it exists, else defaults.
fn load_config(path: Option<&Path>) -> Result<CrudConfig, String> {
    if let Some(path) = path {
        return CrudConfig::load(path).map_err(|e| e.to_string());
    }
    match CrudConfig::default_path().filter(|p| p.exists()) {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            CrudConfig::load(&path).map_err(|e| e.to_string())
        }
        None => Ok(CrudConfig::default()),
    }
}

fn read_action(arg: &str) -> Result<ActionDescriptor, String> {
    let json = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path, e))?,
        None => arg.to_string(),
    };
    let value: serde_json::Value = serde_json::from_str(&json).map_err(|e| format!("invalid action JSON: {}", e))?;
    ActionDescriptor::from_value(value).ok_or_else(|| "action must be a JSON object".to_string())
}

fn open_store(fixtures: Option<&Path>) -> Result<MemoryStore, String> {
    let Some(path) = fixtures else {
        return Ok(MemoryStore::new());
    };
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    let fixtures = Fixture::parse_list(&json).map_err(|e| format!("invalid fixtures: {}", e))?;
    MemoryStore::with_fixtures(fixtures).map_err(|e| format!("cannot seed store: {}", e))
}

async fn cmd_run(config: CrudConfig, action: &str, fixtures: Option<&Path>) -> i32 {
    let action = match read_action(action) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let store = match open_store(fixtures) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let service = CrudService::new(Arc::new(store), config);
    let detached = service.detached().clone();
    let router = service.into_router();

    info!(%action, "dispatching");
    let response = router.dispatch(action).await;
    let failed = detached.drain().await.into_iter().filter(|o| !o.succeeded()).count();
    if failed > 0 {
        eprintln!("Warning: {} detached dispatch(es) failed", failed);
    }

    match response {
        Ok(response) => match serde_json::to_string_pretty(&response) {
            Ok(text) => {
                println!("{}", text);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_show_config(config: &CrudConfig) -> i32 {
    match serde_yaml::to_string(config) {
        Ok(yaml) => {
            print!("{}", yaml);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("entwine=info,warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Run { action, fixtures } => cmd_run(config, &action, fixtures.as_deref()).await,
        Commands::ShowConfig => cmd_show_config(&config),
    };
    std::process::exit(code);
}
