//! Run orchestration for the Railhub pipelines: configuration and source
//! registry, reconciliation, the time-budgeted orchestrator, expiry, bulk
//! facility import, and the optional in-process scheduler.

use std::sync::Arc;

use anyhow::Result;
use railhub_core::Pipeline;
use railhub_storage::{PgStore, Store};

pub mod budget;
pub mod cache;
pub mod config;
pub mod expiry;
pub mod import;
pub mod pipeline;
pub mod reconcile;
pub mod scheduler;

pub use config::{ConfigError, PipelineConfig, SourceRegistry};
pub use expiry::ExpirySweeper;
pub use import::{FacilityImporter, ImportSummary, DEFAULT_IMPORT_SOURCE};
pub use pipeline::{RunError, RunSummary, SyncPipeline};
pub use reconcile::{BatchReport, Decision, ItemError, Outcome, Reconciler};
pub use scheduler::maybe_build_scheduler;

pub const CRATE_NAME: &str = "railhub-sync";

/// Builds a pipeline against Postgres from the environment and the
/// workspace `sources.yaml`.
pub async fn pipeline_from_env() -> Result<SyncPipeline> {
    let config = PipelineConfig::from_env();
    let registry = SourceRegistry::load_or_builtin(&config.registry_path()).await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::connect(&config.database_url).await?);
    SyncPipeline::new(config, registry, store)
}

pub async fn run_sync_once_from_env(pipeline: Pipeline) -> Result<RunSummary> {
    let sync = pipeline_from_env().await?;
    Ok(sync.run_once(pipeline).await?)
}
