use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use railhub_adapters::{AdapterContext, AdapterError, ListingTarget, SourceAdapter};
use railhub_core::{
    AdvisoryType, Job, JobType, Pipeline, RawAdvisory, RawBatch, RawJob, RunStatus, SourceId,
    WorkMode,
};
use railhub_storage::{FetchError, FetchedPage, MemoryStore, PageFetcher, PageRequest};
use railhub_sync::config::SourceConfig;
use railhub_sync::{ConfigError, PipelineConfig, RunError, SourceRegistry, SyncPipeline};
use uuid::Uuid;

/// Adapter that hands out queued batches after an optional delay.
struct Scripted {
    source: SourceId,
    delay: Duration,
    batches: Mutex<VecDeque<Result<RawBatch, String>>>,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn new(source: SourceId, batches: Vec<Result<RawBatch, String>>) -> Self {
        Self {
            source,
            delay: Duration::ZERO,
            batches: Mutex::new(batches.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl SourceAdapter for Scripted {
    fn source_id(&self) -> SourceId {
        self.source
    }

    fn listing_targets(&self, _ctx: &AdapterContext) -> Result<Vec<ListingTarget>, AdapterError> {
        Ok(Vec::new())
    }

    fn parse_listing(
        &self,
        _target: &ListingTarget,
        _page: &FetchedPage,
        _ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError> {
        Ok(RawBatch::empty(self.source.domain()))
    }

    async fn fetch(
        &self,
        _http: &dyn PageFetcher,
        _ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(Ok(batch)) => Ok(batch),
            Some(Err(message)) => Err(AdapterError::Message(message)),
            None => Ok(RawBatch::empty(self.source.domain())),
        }
    }
}

/// Serves one fixture file for every request.
struct FixtureFetcher {
    body: String,
}

impl FixtureFetcher {
    fn new(source: &str, name: &str) -> Self {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../fixtures")
            .join(source)
            .join(name);
        Self {
            body: std::fs::read_to_string(path).unwrap(),
        }
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch_page(
        &self,
        _source: SourceId,
        request: &PageRequest,
    ) -> Result<FetchedPage, FetchError> {
        Ok(FetchedPage {
            status: 200,
            final_url: request.url.clone(),
            body: self.body.clone(),
        })
    }
}

fn registry(enabled: &[SourceId]) -> SourceRegistry {
    SourceRegistry {
        sources: enabled
            .iter()
            .map(|source_id| SourceConfig {
                source_id: *source_id,
                enabled: true,
                notes: None,
            })
            .collect(),
    }
}

fn raw_job(external_id: &str, title: &str, company: &str, city: &str) -> RawJob {
    RawJob {
        external_id: external_id.into(),
        title: title.into(),
        company: company.into(),
        city: Some(city.into()),
        state: None,
        country: Some("US".into()),
        work_mode: None,
        job_type: None,
        category: None,
        experience_level: None,
        salary_min: None,
        salary_max: None,
        salary_period: None,
        description: "Train and yard service".into(),
        apply_url: format!("https://jobs.test/{external_id}"),
        posted_at: Utc::now(),
        expires_at: None,
    }
}

fn advisory(title: &str) -> RawAdvisory {
    RawAdvisory {
        external_id: "E-991".into(),
        railroad: "BNSF".into(),
        advisory_type: AdvisoryType::WeatherAdvisory,
        title: title.into(),
        description: title.into(),
        affected_area: None,
        issued_at: Utc::now(),
        expires_at: None,
    }
}

fn jobs(items: Vec<RawJob>) -> Result<RawBatch, String> {
    Ok(RawBatch::Jobs(items))
}

fn sync(store: &Arc<MemoryStore>, registry: SourceRegistry) -> SyncPipeline {
    SyncPipeline::new(PipelineConfig::default(), registry, store.clone()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn slow_source_exhausts_coarse_budget_and_later_sources_never_run() {
    let store = Arc::new(MemoryStore::new());
    let slow = Scripted::new(
        SourceId::CsxCareers,
        vec![jobs(vec![raw_job("csx-1", "Conductor", "CSX", "Waycross")])],
    )
    .delayed(Duration::from_secs(50));
    let later = Scripted::new(SourceId::AmtrakCareers, vec![]);
    let later_calls = later.calls.clone();

    let summary = sync(
        &store,
        registry(&[SourceId::CsxCareers, SourceId::AmtrakCareers]),
    )
    .with_adapter(Box::new(slow))
    .with_adapter(Box::new(later))
    .run_once(Pipeline::Jobs)
    .await
    .unwrap();

    assert_eq!(later_calls.load(Ordering::SeqCst), 0);
    assert!(summary.success);
    assert_eq!(summary.per_source_counts.len(), 1);
    assert_eq!(summary.per_source_counts["CSX Careers"].created, 1);
    assert!(summary.duration.ends_with('s'));

    // skipped sources get no ledger entry at all
    let ledger = store.ledger().await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].status, RunStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn fine_budget_stops_mid_batch_but_the_source_completes() {
    let store = Arc::new(MemoryStore::new());
    let slow = Scripted::new(
        SourceId::BnsfCareers,
        vec![jobs(vec![
            raw_job("bnsf-1", "Conductor", "BNSF", "Fort Worth"),
            raw_job("bnsf-2", "Carman", "BNSF", "Alliance"),
        ])],
    )
    .delayed(Duration::from_secs(56));

    let summary = sync(&store, registry(&[SourceId::BnsfCareers]))
        .with_adapter(Box::new(slow))
        .run_once(Pipeline::Jobs)
        .await
        .unwrap();

    let counts = summary.per_source_counts["BNSF Careers"];
    assert_eq!((counts.found, counts.created, counts.failed), (2, 0, 0));
    assert!(counts.is_consistent());
    assert_eq!(store.ledger().await[0].status, RunStatus::Completed);
    assert!(store.jobs().await.is_empty());
}

#[tokio::test]
async fn failing_source_is_recorded_and_the_run_moves_on() {
    let store = Arc::new(MemoryStore::new());
    let broken = Scripted::new(SourceId::CsxCareers, vec![Err("oracle hcm returned 502".into())]);
    let healthy = Scripted::new(
        SourceId::NorfolkSouthernCareers,
        vec![jobs(vec![raw_job("1001", "Track Laborer", "Norfolk Southern", "Atlanta")])],
    );

    let summary = sync(
        &store,
        registry(&[SourceId::CsxCareers, SourceId::NorfolkSouthernCareers]),
    )
    .with_adapter(Box::new(broken))
    .with_adapter(Box::new(healthy))
    .run_once(Pipeline::Jobs)
    .await
    .unwrap();

    assert_eq!(summary.per_source_counts["CSX Careers"].found, 0);
    assert_eq!(summary.per_source_counts["Norfolk Southern Careers"].created, 1);

    let ledger = store.ledger().await;
    assert_eq!(ledger[0].status, RunStatus::Failed);
    assert_eq!(ledger[0].error_message.as_deref(), Some("oracle hcm returned 502"));
    assert_eq!(ledger[1].status, RunStatus::Completed);
    assert!(ledger.iter().all(|e| e.completed_at.is_some()));

    let sources = store.sources().await;
    let ns = sources
        .iter()
        .find(|s| s.name == "Norfolk Southern Careers")
        .unwrap();
    assert_eq!(ns.total_records, 1);
    assert!(ns.last_fetch_at.is_some());
    let csx = sources.iter().find(|s| s.name == "CSX Careers").unwrap();
    assert!(csx.last_fetch_at.is_none());
}

#[tokio::test]
async fn one_posting_from_two_sources_in_one_run_is_stored_once() {
    let store = Arc::new(MemoryStore::new());
    let up = Scripted::new(
        SourceId::UnionPacificCareers,
        vec![jobs(vec![raw_job("up-1", "Conductor", "Union Pacific", "Omaha")])],
    );
    let aggregator = Scripted::new(
        SourceId::Jsearch,
        vec![jobs(vec![raw_job("jsearch-55", "Conductor", "Union Pacific", "Omaha")])],
    );
    let config = PipelineConfig {
        jsearch_api_key: Some("test-key".into()),
        ..PipelineConfig::default()
    };

    let summary = SyncPipeline::new(
        config,
        registry(&[SourceId::UnionPacificCareers, SourceId::Jsearch]),
        store.clone(),
    )
    .unwrap()
    .with_adapter(Box::new(up))
    .with_adapter(Box::new(aggregator))
    .run_once(Pipeline::Jobs)
    .await
    .unwrap();

    let jsearch = summary.per_source_counts["JSearch"];
    assert_eq!((jsearch.created, jsearch.updated), (0, 1));

    let stored = store.jobs().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].external_id, "up-1");
}

#[tokio::test]
async fn advisory_is_created_then_updated_across_runs() {
    let store = Arc::new(MemoryStore::new());
    let notices = Scripted::new(
        SourceId::BnsfAdvisories,
        vec![
            Ok(RawBatch::Advisories(vec![advisory("Winter Service Restriction")])),
            Ok(RawBatch::Advisories(vec![advisory(
                "Winter Service Restriction (Updated)",
            )])),
        ],
    );
    let sync = sync(&store, registry(&[SourceId::BnsfAdvisories])).with_adapter(Box::new(notices));

    let first = sync.run_once(Pipeline::Industry).await.unwrap();
    let second = sync.run_once(Pipeline::Industry).await.unwrap();

    assert_eq!(first.per_source_counts["BNSF Customer Notifications"].created, 1);
    assert_eq!(second.per_source_counts["BNSF Customer Notifications"].updated, 1);
    let advisories = store.advisories().await;
    assert_eq!(advisories.len(), 1);
    assert_eq!(advisories[0].title, "Winter Service Restriction (Updated)");
}

#[tokio::test]
async fn missing_credential_refuses_the_run_before_any_source() {
    let store = Arc::new(MemoryStore::new());
    let csx = Scripted::new(SourceId::CsxCareers, vec![]);
    let csx_calls = csx.calls.clone();

    let err = sync(&store, registry(&[SourceId::CsxCareers, SourceId::Jsearch]))
        .with_adapter(Box::new(csx))
        .run_once(Pipeline::Jobs)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::Config(ConfigError::MissingCredential { .. })
    ));
    assert_eq!(csx_calls.load(Ordering::SeqCst), 0);
    assert!(store.ledger().await.is_empty());
}

#[tokio::test]
async fn stale_jobs_are_swept_after_the_sources() {
    let store = Arc::new(MemoryStore::new());
    let posted = Utc::now() - ChronoDuration::days(60);
    store
        .seed_job(Job {
            id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            external_id: "old-1".into(),
            content_hash: "old".into(),
            slug: "old-posting".into(),
            title: "Brakeman".into(),
            company: "Amtrak".into(),
            company_slug: "amtrak".into(),
            city: None,
            state: None,
            country: "US".into(),
            work_mode: WorkMode::Onsite,
            job_type: JobType::FullTime,
            category: None,
            experience_level: None,
            salary_min: None,
            salary_max: None,
            salary_period: None,
            description: String::new(),
            apply_url: String::new(),
            posted_at: posted,
            expires_at: None,
            scraped_at: posted,
            is_active: true,
            created_at: posted,
            updated_at: posted,
        })
        .await;
    let amtrak = Scripted::new(SourceId::AmtrakCareers, vec![]);

    let sync = sync(&store, registry(&[SourceId::AmtrakCareers])).with_adapter(Box::new(amtrak));
    let summary = sync.run_once(Pipeline::Jobs).await.unwrap();
    assert_eq!(summary.total_expired, 1);
    assert_eq!(summary.per_source_counts["Amtrak Careers"].found, 0);

    let again = sync.run_once(Pipeline::Jobs).await.unwrap();
    assert_eq!(again.total_expired, 0);

    let regulatory = sync.run_once(Pipeline::Regulatory).await.unwrap();
    assert!(regulatory.per_source_counts.is_empty());
    assert_eq!(regulatory.total_expired, 0);
}

#[tokio::test]
async fn summary_serializes_in_camel_case() {
    let store = Arc::new(MemoryStore::new());
    let fra = Scripted::new(SourceId::FraSafety, vec![]);
    let summary = sync(&store, registry(&[SourceId::FraSafety]))
        .with_adapter(Box::new(fra))
        .run_once(Pipeline::Regulatory)
        .await
        .unwrap();

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["totalExpired"], 0);
    assert_eq!(json["perSourceCounts"]["FRA Safety Data"]["found"], 0);
    assert!(json["duration"].as_str().unwrap().ends_with('s'));
}

#[tokio::test]
async fn scraped_advisories_are_created_once_and_refreshed_on_the_next_run() {
    let store = Arc::new(MemoryStore::new());
    let sync = sync(&store, registry(&[SourceId::BnsfAdvisories])).with_fetcher(Arc::new(
        FixtureFetcher::new("bnsf-advisories", "customer-notifications.html"),
    ));

    let first = sync.run_once(Pipeline::Industry).await.unwrap();
    let counts = first.per_source_counts["BNSF Customer Notifications"];
    assert_eq!((counts.found, counts.created, counts.updated), (3, 3, 0));

    let second = sync.run_once(Pipeline::Industry).await.unwrap();
    let counts = second.per_source_counts["BNSF Customer Notifications"];
    assert_eq!((counts.found, counts.created, counts.updated), (3, 0, 3));

    let advisories = store.advisories().await;
    assert_eq!(advisories.len(), 3);
    let mut slugs: Vec<_> = advisories.iter().map(|a| a.slug.clone()).collect();
    slugs.sort();
    slugs.dedup();
    assert_eq!(slugs.len(), 3);

    let source = &store.sources().await[0];
    assert_eq!(source.total_records, 3);
}

/// Every request overruns the body ceiling.
struct OversizedFetcher;

#[async_trait]
impl PageFetcher for OversizedFetcher {
    async fn fetch_page(
        &self,
        _source: SourceId,
        request: &PageRequest,
    ) -> Result<FetchedPage, FetchError> {
        Err(FetchError::BodyTooLarge {
            url: request.url.clone(),
            limit: 16 * 1024 * 1024,
        })
    }
}

#[tokio::test]
async fn oversized_listing_fails_the_source_instead_of_reporting_it_empty() {
    let store = Arc::new(MemoryStore::new());
    let sync = sync(&store, registry(&[SourceId::BnsfAdvisories]))
        .with_fetcher(Arc::new(OversizedFetcher));

    let summary = sync.run_once(Pipeline::Industry).await.unwrap();
    assert!(summary.success);

    let ledger = store.ledger().await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].status, RunStatus::Failed);
    let message = ledger[0].error_message.as_deref().unwrap();
    assert!(message.contains("cut off"), "{message}");
    assert!(message.contains("exceeds"), "{message}");
    assert!(store.advisories().await.is_empty());
}
