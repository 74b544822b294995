//! `stage-tracker` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — build a workflow definition's graph and report problems.
//! - `simulate` — run a definition on the local engine and print the stage
//!   records the tracker wrote.
//! - `migrate`  — apply the stage state migrations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use db::{InMemoryStageStateStore, PgStageStateStore, StageStateStore};
use engine::{
    default_registry, LocalProcessEngine, ProcessGraph, RunnerConfig, StageInstanceTracker,
    WorkflowDefinition,
};

#[derive(Parser)]
#[command(
    name = "stage-tracker",
    about = "Records stage-by-stage execution of governance workflows",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Run a workflow definition once on the local engine.
    Simulate {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// Initial variables as a JSON object.
        #[arg(long, default_value = "{}")]
        variables: String,
        /// Persist stage records to Postgres instead of memory.
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
        #[arg(long, default_value_t = 5)]
        max_connections: u32,
        /// Upper bound on transitions followed in the run.
        #[arg(long, default_value_t = RunnerConfig::default().max_transitions)]
        max_transitions: usize,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let definition = load_definition(&path)?;
            match ProcessGraph::build(&definition) {
                Ok(graph) => {
                    println!(
                        "✅ Workflow '{}' v{} is valid: {} stages, {} edges.",
                        graph.name(),
                        graph.version(),
                        graph.stages().len(),
                        graph.edges().len()
                    );
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Simulate {
            path,
            variables,
            database_url,
            max_connections,
            max_transitions,
        } => {
            let definition = load_definition(&path)?;
            let graph = ProcessGraph::build(&definition)
                .with_context(|| format!("workflow {} is not executable", path.display()))?;

            let parsed: serde_json::Value =
                serde_json::from_str(&variables).context("invalid --variables")?;
            let initial = match parsed {
                serde_json::Value::Object(map) => map,
                other => bail!("--variables must be a JSON object, got {other}"),
            };

            let store: Arc<dyn StageStateStore> = match database_url {
                Some(url) => {
                    let pool = db::pool::create_pool(&url, max_connections).await?;
                    Arc::new(PgStageStateStore::new(pool))
                }
                None => Arc::new(InMemoryStageStateStore::new()),
            };

            let engine = LocalProcessEngine::new(
                Arc::new(StageInstanceTracker::new(store.clone())),
                default_registry(),
                RunnerConfig {
                    max_transitions,
                    ..RunnerConfig::default()
                },
            );

            let instance_id = Uuid::new_v4();
            let outcome = engine.run(&graph, instance_id, initial).await?;
            info!("visited stages: {:?}", outcome.visited);

            let records = store.list_for_instance(instance_id).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Migrate { database_url } => {
            info!("Running migrations");
            let pool = db::pool::create_pool(&database_url, 2).await?;
            db::pool::run_migrations(&pool).await?;
            info!("Migrations applied successfully");
        }
    }

    Ok(())
}

fn load_definition(path: &Path) -> Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid workflow JSON in {}", path.display()))
}
