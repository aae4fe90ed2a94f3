use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use railhub_adapters::{adapter_for, AdapterContext, SourceAdapter};
use railhub_core::{Domain, Pipeline, RunLedgerEntry, SourceCounts, SourceId};
use railhub_storage::{HttpClientConfig, HttpFetcher, PageFetcher, Store};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::budget::RunBudget;
use crate::cache::RunCache;
use crate::config::{ConfigError, PipelineConfig, SourceRegistry};
use crate::expiry::ExpirySweeper;
use crate::reconcile::Reconciler;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub success: bool,
    pub duration: String,
    /// Keyed by source display name. Sources skipped by the coarse budget are absent.
    pub per_source_counts: BTreeMap<String, SourceCounts>,
    pub total_expired: u64,
}

/// Runs one pipeline's sources in order under the run budget, then sweeps
/// expired records.
pub struct SyncPipeline {
    config: PipelineConfig,
    registry: SourceRegistry,
    store: Arc<dyn Store>,
    http: Arc<dyn PageFetcher>,
    sweeper: ExpirySweeper,
    adapters: HashMap<SourceId, Box<dyn SourceAdapter>>,
}

impl SyncPipeline {
    pub fn new(
        config: PipelineConfig,
        registry: SourceRegistry,
        store: Arc<dyn Store>,
    ) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: config.user_agent.clone(),
            ..Default::default()
        })?;
        let sweeper = ExpirySweeper::new(store.clone(), config.job_max_age_days);
        Ok(Self {
            config,
            registry,
            store,
            http: Arc::new(http),
            sweeper,
            adapters: HashMap::new(),
        })
    }

    pub fn with_fetcher(mut self, http: Arc<dyn PageFetcher>) -> Self {
        self.http = http;
        self
    }

    /// Replaces the built-in adapter for `adapter.source_id()`.
    pub fn with_adapter(mut self, adapter: Box<dyn SourceAdapter>) -> Self {
        self.adapters.insert(adapter.source_id(), adapter);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub async fn run_once(&self, pipeline: Pipeline) -> Result<RunSummary, RunError> {
        let sources = self.registry.plan(pipeline, &self.config)?;
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", pipeline = pipeline.as_str(), %run_id);
        self.run_sources(pipeline, run_id, &sources)
            .instrument(span)
            .await
            .map_err(RunError::from)
    }

    async fn run_sources(
        &self,
        pipeline: Pipeline,
        run_id: Uuid,
        sources: &[SourceId],
    ) -> Result<RunSummary> {
        let budget = RunBudget::start(self.config.coarse_budget, self.config.fine_budget);
        let mut cache = RunCache::new();
        let ctx = AdapterContext {
            jsearch_api_key: self.config.jsearch_api_key.clone(),
            page_delay: self.config.page_delay,
            ..AdapterContext::new(run_id, Utc::now())
        };
        info!(sources = sources.len(), "run started");

        let mut per_source_counts = BTreeMap::new();
        for (idx, source) in sources.iter().enumerate() {
            if budget.coarse_exceeded() {
                info!(
                    elapsed = ?budget.elapsed(),
                    skipped = sources.len() - idx,
                    "coarse budget exhausted, skipping remaining sources"
                );
                break;
            }
            let counts = self
                .run_source(*source, &budget, &mut cache, &ctx)
                .instrument(info_span!("source", source = source.slug()))
                .await?;
            per_source_counts.insert(source.display_name().to_string(), counts);
        }

        let total_expired = self
            .sweeper
            .sweep(pipeline.expiring_domains(), Utc::now())
            .await;
        let summary = RunSummary {
            success: true,
            duration: budget.duration_label(),
            per_source_counts,
            total_expired,
        };
        info!(duration = %summary.duration, total_expired, "run finished");
        Ok(summary)
    }

    /// Fetches and reconciles one source under its own ledger entry. Adapter
    /// and lookup failures fail the entry, not the run.
    async fn run_source(
        &self,
        source: SourceId,
        budget: &RunBudget,
        cache: &mut RunCache,
        ctx: &AdapterContext,
    ) -> Result<SourceCounts> {
        let feed = self
            .store
            .upsert_source(source.display_name(), source.kind(), source.base_url())
            .await
            .with_context(|| format!("upserting source {}", source.display_name()))?;
        let mut entry = RunLedgerEntry::start(feed.id, Utc::now());
        self.store
            .open_run(&entry)
            .await
            .context("opening run ledger entry")?;

        let builtin;
        let adapter: &dyn SourceAdapter = match self.adapters.get(&source) {
            Some(adapter) => adapter.as_ref(),
            None => {
                builtin = adapter_for(source);
                builtin.as_ref()
            }
        };

        let mut counts = SourceCounts::default();
        let outcome: Result<()> = async {
            let batch = adapter.fetch(self.http.as_ref(), ctx).await?;
            counts = SourceCounts::found(batch.len());
            info!(found = counts.found, "fetched");

            let report = Reconciler::new(self.store.as_ref(), cache, budget, feed.id, Utc::now())
                .reconcile(batch)
                .await?;
            counts = report.counts();
            if let Some(first) = report.errors().next() {
                warn!(failed = counts.failed, first = %first, "items failed");
            }
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                let total_records = match source.domain() {
                    Domain::Job => self.store.count_active_jobs(feed.id).await,
                    _ => Ok(i64::from(counts.created + counts.updated)),
                };
                match total_records {
                    Ok(total) => {
                        if let Err(err) = self.store.record_source_fetch(feed.id, Utc::now(), total).await {
                            warn!(error = %format!("{err:#}"), "could not record source fetch");
                        }
                    }
                    Err(err) => warn!(error = %format!("{err:#}"), "could not count source records"),
                }
                info!(
                    created = counts.created,
                    updated = counts.updated,
                    failed = counts.failed,
                    "source completed"
                );
                entry.complete(counts, Utc::now());
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "source failed");
                entry.fail(counts, format!("{err:#}"), Utc::now());
            }
        }

        self.store
            .close_run(&entry)
            .await
            .context("closing run ledger entry")?;
        Ok(counts)
    }
}
