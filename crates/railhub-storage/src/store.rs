use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use railhub_core::{
    Advisory, AdvisoryRefresh, Facility, FacilityDraft, FeedSource, FuelSurcharge, Job, JobRefresh,
    Metric, MetricKey, OrgKey, RegulatoryRefresh, RegulatoryUpdate, RunLedgerEntry, SourceKind,
    SurchargeKey,
};
use uuid::Uuid;

/// Persistence boundary for reconciliation, expiry and run bookkeeping.
///
/// Lookups are bulk and take the batch's keys: callers build one map per
/// batch and never query per item. Inserts are upserts on the domain's unique
/// key so overlapping runs degrade to a double update, never a duplicate row.
#[async_trait]
pub trait Store: Send + Sync {
    /// Finds a source by its unique name, creating it on first encounter.
    async fn upsert_source(
        &self,
        name: &str,
        kind: SourceKind,
        base_url: &str,
    ) -> anyhow::Result<FeedSource>;

    async fn record_source_fetch(
        &self,
        source_id: Uuid,
        fetched_at: DateTime<Utc>,
        total_records: i64,
    ) -> anyhow::Result<()>;

    async fn open_run(&self, entry: &RunLedgerEntry) -> anyhow::Result<()>;

    /// Writes the terminal status, counts and error text of an open entry.
    async fn close_run(&self, entry: &RunLedgerEntry) -> anyhow::Result<()>;

    /// Jobs of `source_id` whose external id is among `external_ids`.
    async fn job_ids_by_external_id(
        &self,
        source_id: Uuid,
        external_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Uuid>>;

    /// The subset of `fingerprints` already stored, across all sources.
    async fn job_fingerprints(&self, fingerprints: &[String]) -> anyhow::Result<HashSet<String>>;

    async fn insert_job(&self, job: &Job) -> anyhow::Result<()>;

    /// Applies `refresh` and reasserts the job as active.
    async fn refresh_job(&self, id: Uuid, refresh: &JobRefresh) -> anyhow::Result<()>;

    async fn count_active_jobs(&self, source_id: Uuid) -> anyhow::Result<i64>;

    async fn metric_ids_by_key(
        &self,
        keys: &[MetricKey],
    ) -> anyhow::Result<HashMap<MetricKey, Uuid>>;

    async fn upsert_metric(&self, metric: &Metric) -> anyhow::Result<()>;

    async fn surcharge_ids_by_key(
        &self,
        keys: &[SurchargeKey],
    ) -> anyhow::Result<HashMap<SurchargeKey, Uuid>>;

    async fn upsert_surcharge(&self, surcharge: &FuelSurcharge) -> anyhow::Result<()>;

    /// Advisories issued by any of `railroads` under any of `external_ids`,
    /// keyed by external id and railroad.
    async fn advisory_ids_by_key(
        &self,
        railroads: &[String],
        external_ids: &[String],
    ) -> anyhow::Result<HashMap<OrgKey, Uuid>>;

    async fn insert_advisory(&self, advisory: &Advisory) -> anyhow::Result<()>;

    /// Applies `refresh` and reasserts the advisory as active.
    async fn refresh_advisory(&self, id: Uuid, refresh: &AdvisoryRefresh) -> anyhow::Result<()>;

    async fn regulatory_ids_by_key(
        &self,
        agencies: &[String],
        external_ids: &[String],
    ) -> anyhow::Result<HashMap<OrgKey, Uuid>>;

    async fn insert_regulatory(&self, update: &RegulatoryUpdate) -> anyhow::Result<()>;

    async fn refresh_regulatory(
        &self,
        id: Uuid,
        refresh: &RegulatoryRefresh,
    ) -> anyhow::Result<()>;

    async fn facility_ids_by_external_id(
        &self,
        external_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Uuid>>;

    async fn insert_facility(&self, facility: &Facility) -> anyhow::Result<()>;

    async fn update_facility(
        &self,
        id: Uuid,
        draft: &FacilityDraft,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Deactivates active jobs past `expires_at`, or posted before `stale_before`.
    async fn expire_jobs(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> anyhow::Result<u64>;

    /// Deactivates active advisories past `expires_at`.
    async fn expire_advisories(&self, now: DateTime<Utc>) -> anyhow::Result<u64>;
}
