use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use railhub_core::Pipeline;
use railhub_storage::{MemoryStore, PgStore, Store};
use railhub_sync::{
    maybe_build_scheduler, pipeline_from_env, run_sync_once_from_env, FacilityImporter,
    PipelineConfig, SourceRegistry, SyncPipeline, DEFAULT_IMPORT_SOURCE,
};
use railhub_web::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "railhub-cli")]
#[command(about = "Railhub ingestion pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one pipeline once and print its summary.
    Sync {
        #[arg(value_parser = parse_pipeline, default_value = "jobs")]
        pipeline: Pipeline,
        /// Reconcile into an in-process store instead of Postgres.
        #[arg(long)]
        memory: bool,
    },
    /// Serve the trigger and import endpoints, plus the scheduler when enabled.
    Serve,
    /// Apply the SQL schema.
    Migrate,
    /// Import facilities from a delimited file.
    Import {
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_IMPORT_SOURCE)]
        source: String,
    },
}

fn parse_pipeline(value: &str) -> Result<Pipeline, String> {
    Pipeline::parse(value).ok_or_else(|| {
        let known: Vec<&str> = Pipeline::ALL.iter().map(|p| p.as_str()).collect();
        format!("unknown pipeline {value:?}, expected one of {}", known.join(", "))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync {
        pipeline: Pipeline::Jobs,
        memory: false,
    }) {
        Commands::Sync { pipeline, memory } => {
            let summary = if memory {
                memory_pipeline().await?.run_once(pipeline).await?
            } else {
                run_sync_once_from_env(pipeline).await?
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Serve => {
            let sync = Arc::new(pipeline_from_env().await?);
            let port = sync.config().web_port;
            let scheduler = maybe_build_scheduler(Arc::clone(&sync)).await?;
            if let Some(sched) = &scheduler {
                sched.start().await.context("starting scheduler")?;
                info!("scheduler started");
            }
            railhub_web::serve(AppState::new(sync), port).await?;
        }
        Commands::Migrate => {
            let config = PipelineConfig::from_env();
            let store = PgStore::connect(&config.database_url).await?;
            store.migrate().await?;
        }
        Commands::Import { file, source } => {
            let config = PipelineConfig::from_env();
            let content = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let store: Arc<dyn Store> = Arc::new(PgStore::connect(&config.database_url).await?);
            let summary = FacilityImporter::new(store).import(&content, &source).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

/// Live fetches reconciled into a throwaway store; nothing is persisted.
async fn memory_pipeline() -> Result<SyncPipeline> {
    let config = PipelineConfig::from_env();
    let registry = SourceRegistry::load_or_builtin(&config.registry_path()).await?;
    SyncPipeline::new(config, registry, Arc::new(MemoryStore::new()))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
