use std::sync::Arc;

use anyhow::{Context, Result};
use railhub_core::Pipeline;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::pipeline::SyncPipeline;

/// One cron job per pipeline when `scheduler_enabled` is set; `None` otherwise.
/// The caller owns starting and shutting down the returned scheduler.
pub async fn maybe_build_scheduler(sync: Arc<SyncPipeline>) -> Result<Option<JobScheduler>> {
    if !sync.config().scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    for pipeline in Pipeline::ALL {
        let cron = sync.config().cron_for(pipeline).to_string();
        let job_sync = Arc::clone(&sync);
        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let sync = Arc::clone(&job_sync);
            Box::pin(async move {
                match sync.run_once(pipeline).await {
                    Ok(summary) => info!(
                        pipeline = pipeline.as_str(),
                        duration = %summary.duration,
                        total_expired = summary.total_expired,
                        "scheduled run finished"
                    ),
                    Err(err) => error!(pipeline = pipeline.as_str(), error = %err, "scheduled run failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        info!(pipeline = pipeline.as_str(), %cron, "scheduled pipeline");
    }
    Ok(Some(sched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, SourceRegistry};
    use railhub_storage::MemoryStore;

    fn pipeline(config: PipelineConfig) -> Arc<SyncPipeline> {
        Arc::new(
            SyncPipeline::new(config, SourceRegistry::builtin(), Arc::new(MemoryStore::new()))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn disabled_scheduler_builds_nothing() {
        let sched = maybe_build_scheduler(pipeline(PipelineConfig::default()))
            .await
            .unwrap();
        assert!(sched.is_none());
    }

    #[tokio::test]
    async fn invalid_cron_is_reported() {
        let config = PipelineConfig {
            scheduler_enabled: true,
            jobs_cron: "every tuesday".into(),
            ..PipelineConfig::default()
        };
        let err = maybe_build_scheduler(pipeline(config)).await.err().unwrap();
        assert!(format!("{err:#}").contains("every tuesday"));
    }
}
