//! Create / update / skip decisions for one source's batch.
//!
//! Existing records are looked up with one bulk query per batch before the
//! item loop. Each item then yields its own `Result<Outcome, ItemError>`, so
//! a failing item is counted and the batch carries on.

use std::collections::HashMap;
use std::hash::Hash;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use railhub_core::classify::classify_job;
use railhub_core::identity::{advisory_slug, company_slug, job_slug, regulatory_slug};
use railhub_core::{
    Advisory, AdvisoryRefresh, FuelSurcharge, Job, JobRefresh, JobType, Metric, MetricKey,
    RawAdvisory, RawBatch, RawFuelSurcharge, RawJob, RawMetric, RawRegulatoryUpdate,
    RegulatoryRefresh, RegulatoryUpdate, SourceCounts, SurchargeKey, WorkMode,
};
use railhub_storage::Store;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::budget::RunBudget;
use crate::cache::RunCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Create,
    Update(Uuid),
    SkipDuplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    SkippedDuplicate,
}

#[derive(Debug, Error)]
#[error("{item}: {message}")]
pub struct ItemError {
    pub item: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub found: usize,
    pub items: Vec<Result<Outcome, ItemError>>,
    /// Items never reached because the fine budget ran out.
    pub unprocessed: usize,
}

impl BatchReport {
    fn new(found: usize) -> Self {
        Self {
            found,
            ..Self::default()
        }
    }

    fn push(&mut self, item: &str, result: Result<Outcome>) {
        let result = result.map_err(|err| {
            warn!(item, error = %format!("{err:#}"), "item failed");
            ItemError {
                item: item.to_string(),
                message: format!("{err:#}"),
            }
        });
        self.items.push(result);
    }

    /// Skipped duplicates count as updates.
    pub fn counts(&self) -> SourceCounts {
        let mut counts = SourceCounts::found(self.found);
        for item in &self.items {
            match item {
                Ok(Outcome::Created) => counts.created += 1,
                Ok(Outcome::Updated | Outcome::SkippedDuplicate) => counts.updated += 1,
                Err(_) => counts.failed += 1,
            }
        }
        counts
    }

    pub fn errors(&self) -> impl Iterator<Item = &ItemError> {
        self.items.iter().filter_map(|item| item.as_ref().err())
    }
}

/// Source-scoped external id first, then the cross-source fingerprint.
pub fn decide_job(
    external_id: &str,
    fingerprint: &str,
    by_external_id: &HashMap<String, Uuid>,
    cache: &RunCache,
) -> Decision {
    if let Some(id) = by_external_id.get(external_id) {
        return Decision::Update(*id);
    }
    if cache.has_fingerprint(fingerprint) {
        return Decision::SkipDuplicate;
    }
    Decision::Create
}

pub fn decide_by_key<K: Eq + Hash>(key: &K, existing: &HashMap<K, Uuid>) -> Decision {
    match existing.get(key) {
        Some(id) => Decision::Update(*id),
        None => Decision::Create,
    }
}

fn job_from_raw(
    raw: &RawJob,
    source_id: Uuid,
    content_hash: String,
    slug: String,
    now: DateTime<Utc>,
) -> Job {
    Job {
        id: Uuid::new_v4(),
        source_id,
        external_id: raw.external_id.clone(),
        content_hash,
        slug,
        title: raw.title.clone(),
        company: raw.company.clone(),
        company_slug: company_slug(&raw.company),
        city: raw.city.clone(),
        state: raw.state.clone(),
        country: raw.country.clone().unwrap_or_else(|| "US".to_string()),
        work_mode: raw.work_mode.unwrap_or(WorkMode::Onsite),
        job_type: raw.job_type.unwrap_or(JobType::FullTime),
        category: raw
            .category
            .or_else(|| classify_job(&raw.title, &raw.description)),
        experience_level: raw.experience_level,
        salary_min: raw.salary_min,
        salary_max: raw.salary_max,
        salary_period: raw.salary_period,
        description: raw.description.clone(),
        apply_url: raw.apply_url.clone(),
        posted_at: raw.posted_at,
        expires_at: raw.expires_at,
        scraped_at: now,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn distinct<I: IntoIterator<Item = String>>(values: I) -> Vec<String> {
    let mut out: Vec<String> = values.into_iter().collect();
    out.sort();
    out.dedup();
    out
}

pub struct Reconciler<'a> {
    store: &'a dyn Store,
    cache: &'a mut RunCache,
    budget: &'a RunBudget,
    source_id: Uuid,
    now: DateTime<Utc>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        store: &'a dyn Store,
        cache: &'a mut RunCache,
        budget: &'a RunBudget,
        source_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            cache,
            budget,
            source_id,
            now,
        }
    }

    /// Fails only when a bulk lookup fails; item failures land in the report.
    pub async fn reconcile(&mut self, batch: RawBatch) -> Result<BatchReport> {
        let report = match batch {
            RawBatch::Jobs(items) => self.jobs(items).await?,
            RawBatch::Metrics(items) => self.metrics(items).await?,
            RawBatch::FuelSurcharges(items) => self.surcharges(items).await?,
            RawBatch::Advisories(items) => self.advisories(items).await?,
            RawBatch::Regulatory(items) => self.regulatory(items).await?,
        };
        debug!(
            found = report.found,
            processed = report.items.len(),
            unprocessed = report.unprocessed,
            "batch reconciled"
        );
        Ok(report)
    }

    fn out_of_time(&self, report: &mut BatchReport, remaining: usize) -> bool {
        if self.budget.fine_exceeded() {
            warn!(remaining, elapsed = ?self.budget.elapsed(), "fine budget exhausted, stopping batch");
            report.unprocessed = remaining;
            true
        } else {
            false
        }
    }

    async fn jobs(&mut self, items: Vec<RawJob>) -> Result<BatchReport> {
        let mut report = BatchReport::new(items.len());
        if items.is_empty() {
            return Ok(report);
        }
        let external_ids = distinct(items.iter().map(|j| j.external_id.clone()));
        let fingerprints: Vec<String> = items.iter().map(RawJob::fingerprint).collect();
        let mut by_external_id = self
            .store
            .job_ids_by_external_id(self.source_id, &external_ids)
            .await
            .context("loading jobs by external id")?;
        self.cache.load_fingerprints(self.store, &fingerprints).await?;

        for (idx, (raw, fingerprint)) in items.iter().zip(fingerprints).enumerate() {
            if self.out_of_time(&mut report, items.len() - idx) {
                break;
            }
            let result = match decide_job(&raw.external_id, &fingerprint, &by_external_id, self.cache) {
                Decision::Update(id) => self
                    .store
                    .refresh_job(id, &JobRefresh::from_raw(raw, self.now))
                    .await
                    .map(|()| Outcome::Updated),
                Decision::SkipDuplicate => {
                    debug!(external_id = %raw.external_id, "cross-source duplicate");
                    Ok(Outcome::SkippedDuplicate)
                }
                Decision::Create => {
                    let slug = self.cache.issue_slug(|| {
                        job_slug(
                            &raw.title,
                            &raw.company,
                            raw.city.as_deref(),
                            raw.state.as_deref(),
                        )
                    });
                    let job = job_from_raw(raw, self.source_id, fingerprint.clone(), slug, self.now);
                    match self.store.insert_job(&job).await {
                        Ok(()) => {
                            self.cache.remember_fingerprint(fingerprint);
                            by_external_id.insert(raw.external_id.clone(), job.id);
                            Ok(Outcome::Created)
                        }
                        Err(err) => Err(err),
                    }
                }
            };
            report.push(&raw.external_id, result);
        }
        Ok(report)
    }

    async fn metrics(&mut self, items: Vec<RawMetric>) -> Result<BatchReport> {
        let mut report = BatchReport::new(items.len());
        if items.is_empty() {
            return Ok(report);
        }
        let keys: Vec<MetricKey> = items.iter().map(RawMetric::key).collect();
        let mut existing = self
            .store
            .metric_ids_by_key(&keys)
            .await
            .context("loading metrics by key")?;

        for (idx, (raw, key)) in items.iter().zip(&keys).enumerate() {
            if self.out_of_time(&mut report, items.len() - idx) {
                break;
            }
            let mut metric = Metric::from_raw(raw, self.source_id, self.now);
            let outcome = match decide_by_key(key, &existing) {
                Decision::Update(id) => {
                    metric.id = id;
                    Outcome::Updated
                }
                _ => Outcome::Created,
            };
            let result = self.store.upsert_metric(&metric).await.map(|()| {
                existing.insert(key.clone(), metric.id);
                outcome
            });
            let label = format!(
                "{}/{}/{}",
                key.railroad,
                key.metric_type.as_str(),
                key.report_week
            );
            report.push(&label, result);
        }
        Ok(report)
    }

    async fn surcharges(&mut self, items: Vec<RawFuelSurcharge>) -> Result<BatchReport> {
        let mut report = BatchReport::new(items.len());
        if items.is_empty() {
            return Ok(report);
        }
        let keys: Vec<SurchargeKey> = items.iter().map(RawFuelSurcharge::key).collect();
        let mut existing = self
            .store
            .surcharge_ids_by_key(&keys)
            .await
            .context("loading fuel surcharges by key")?;

        for (idx, (raw, key)) in items.iter().zip(&keys).enumerate() {
            if self.out_of_time(&mut report, items.len() - idx) {
                break;
            }
            let mut surcharge = FuelSurcharge::from_raw(raw, self.source_id, self.now);
            let outcome = match decide_by_key(key, &existing) {
                Decision::Update(id) => {
                    surcharge.id = id;
                    Outcome::Updated
                }
                _ => Outcome::Created,
            };
            let result = self.store.upsert_surcharge(&surcharge).await.map(|()| {
                existing.insert(key.clone(), surcharge.id);
                outcome
            });
            let label = format!("{}/{}/{}", key.railroad, key.traffic_type, key.effective_date);
            report.push(&label, result);
        }
        Ok(report)
    }

    async fn advisories(&mut self, items: Vec<RawAdvisory>) -> Result<BatchReport> {
        let mut report = BatchReport::new(items.len());
        if items.is_empty() {
            return Ok(report);
        }
        let railroads = distinct(items.iter().map(|a| a.railroad.clone()));
        let external_ids = distinct(items.iter().map(|a| a.external_id.clone()));
        let mut existing = self
            .store
            .advisory_ids_by_key(&railroads, &external_ids)
            .await
            .context("loading advisories by key")?;

        for (idx, raw) in items.iter().enumerate() {
            if self.out_of_time(&mut report, items.len() - idx) {
                break;
            }
            let key = raw.key();
            let result = match decide_by_key(&key, &existing) {
                Decision::Update(id) => self
                    .store
                    .refresh_advisory(id, &AdvisoryRefresh::from_raw(raw, self.now))
                    .await
                    .map(|()| Outcome::Updated),
                _ => {
                    let slug = self
                        .cache
                        .issue_slug(|| advisory_slug(&raw.title, &raw.railroad));
                    let advisory = Advisory::from_raw(raw, self.source_id, slug, self.now);
                    self.store.insert_advisory(&advisory).await.map(|()| {
                        existing.insert(key, advisory.id);
                        Outcome::Created
                    })
                }
            };
            report.push(&raw.external_id, result);
        }
        Ok(report)
    }

    async fn regulatory(&mut self, items: Vec<RawRegulatoryUpdate>) -> Result<BatchReport> {
        let mut report = BatchReport::new(items.len());
        if items.is_empty() {
            return Ok(report);
        }
        let agencies = distinct(items.iter().map(|u| u.agency.as_str().to_string()));
        let external_ids = distinct(items.iter().map(|u| u.external_id.clone()));
        let mut existing = self
            .store
            .regulatory_ids_by_key(&agencies, &external_ids)
            .await
            .context("loading regulatory updates by key")?;

        for (idx, raw) in items.iter().enumerate() {
            if self.out_of_time(&mut report, items.len() - idx) {
                break;
            }
            let key = raw.key();
            let result = match decide_by_key(&key, &existing) {
                Decision::Update(id) => self
                    .store
                    .refresh_regulatory(id, &RegulatoryRefresh::from_raw(raw, self.now))
                    .await
                    .map(|()| Outcome::Updated),
                _ => {
                    let slug = self
                        .cache
                        .issue_slug(|| regulatory_slug(&raw.title, raw.agency.as_str()));
                    let update = RegulatoryUpdate::from_raw(raw, self.source_id, slug, self.now);
                    self.store.insert_regulatory(&update).await.map(|()| {
                        existing.insert(key, update.id);
                        Outcome::Created
                    })
                }
            };
            report.push(&raw.external_id, result);
        }
        Ok(report)
    }
}
