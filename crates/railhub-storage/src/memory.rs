use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use railhub_core::{
    Advisory, AdvisoryRefresh, Facility, FacilityDraft, FeedSource, FuelSurcharge, Job, JobRefresh,
    Metric, MetricKey, OrgKey, RegulatoryRefresh, RegulatoryUpdate, RunLedgerEntry, SourceKind,
    SurchargeKey,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::Store;

#[derive(Debug, Default)]
struct MemoryState {
    sources: Vec<FeedSource>,
    ledger: Vec<RunLedgerEntry>,
    jobs: Vec<Job>,
    metrics: Vec<Metric>,
    surcharges: Vec<FuelSurcharge>,
    advisories: Vec<Advisory>,
    regulatory: Vec<RegulatoryUpdate>,
    facilities: Vec<Facility>,
    failing_external_ids: HashSet<String>,
}

impl MemoryState {
    fn check_writable(&self, external_id: &str) -> anyhow::Result<()> {
        if self.failing_external_ids.contains(external_id) {
            bail!("write rejected for {external_id}");
        }
        Ok(())
    }
}

/// In-process `Store` for tests and `--memory` dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later write of a record with this external id fail.
    pub async fn fail_writes_for(&self, external_id: impl Into<String>) {
        self.state
            .lock()
            .await
            .failing_external_ids
            .insert(external_id.into());
    }

    pub async fn sources(&self) -> Vec<FeedSource> {
        self.state.lock().await.sources.clone()
    }

    pub async fn ledger(&self) -> Vec<RunLedgerEntry> {
        self.state.lock().await.ledger.clone()
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.state.lock().await.jobs.clone()
    }

    pub async fn metrics(&self) -> Vec<Metric> {
        self.state.lock().await.metrics.clone()
    }

    pub async fn surcharges(&self) -> Vec<FuelSurcharge> {
        self.state.lock().await.surcharges.clone()
    }

    pub async fn advisories(&self) -> Vec<Advisory> {
        self.state.lock().await.advisories.clone()
    }

    pub async fn regulatory(&self) -> Vec<RegulatoryUpdate> {
        self.state.lock().await.regulatory.clone()
    }

    pub async fn facilities(&self) -> Vec<Facility> {
        self.state.lock().await.facilities.clone()
    }

    /// Seeds a job directly, bypassing reconciliation.
    pub async fn seed_job(&self, job: Job) {
        self.state.lock().await.jobs.push(job);
    }

    pub async fn seed_advisory(&self, advisory: Advisory) {
        self.state.lock().await.advisories.push(advisory);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_source(
        &self,
        name: &str,
        kind: SourceKind,
        base_url: &str,
    ) -> anyhow::Result<FeedSource> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.sources.iter().find(|s| s.name == name) {
            return Ok(existing.clone());
        }
        let source = FeedSource {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind,
            base_url: base_url.to_string(),
            last_fetch_at: None,
            total_records: 0,
            created_at: Utc::now(),
        };
        state.sources.push(source.clone());
        Ok(source)
    }

    async fn record_source_fetch(
        &self,
        source_id: Uuid,
        fetched_at: DateTime<Utc>,
        total_records: i64,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        let source = state
            .sources
            .iter_mut()
            .find(|s| s.id == source_id)
            .ok_or_else(|| anyhow!("unknown source {source_id}"))?;
        source.last_fetch_at = Some(fetched_at);
        source.total_records = total_records;
        Ok(())
    }

    async fn open_run(&self, entry: &RunLedgerEntry) -> anyhow::Result<()> {
        self.state.lock().await.ledger.push(entry.clone());
        Ok(())
    }

    async fn close_run(&self, entry: &RunLedgerEntry) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        let slot = state
            .ledger
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or_else(|| anyhow!("unknown ledger entry {}", entry.id))?;
        if slot.status.is_terminal() {
            bail!("ledger entry {} already closed", entry.id);
        }
        *slot = entry.clone();
        Ok(())
    }

    async fn job_ids_by_external_id(
        &self,
        source_id: Uuid,
        external_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Uuid>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .filter(|j| j.source_id == source_id && external_ids.contains(&j.external_id))
            .map(|j| (j.external_id.clone(), j.id))
            .collect())
    }

    async fn job_fingerprints(&self, fingerprints: &[String]) -> anyhow::Result<HashSet<String>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .filter(|j| fingerprints.contains(&j.content_hash))
            .map(|j| j.content_hash.clone())
            .collect())
    }

    async fn insert_job(&self, job: &Job) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.check_writable(&job.external_id)?;
        match state
            .jobs
            .iter_mut()
            .find(|j| j.source_id == job.source_id && j.external_id == job.external_id)
        {
            Some(existing) => {
                existing.title = job.title.clone();
                existing.description = job.description.clone();
                existing.salary_min = job.salary_min;
                existing.salary_max = job.salary_max;
                existing.apply_url = job.apply_url.clone();
                existing.scraped_at = job.scraped_at;
                existing.is_active = true;
                existing.updated_at = job.updated_at;
            }
            None => state.jobs.push(job.clone()),
        }
        Ok(())
    }

    async fn refresh_job(&self, id: Uuid, refresh: &JobRefresh) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        let external_id = state
            .jobs
            .iter()
            .find(|j| j.id == id)
            .map(|j| j.external_id.clone())
            .ok_or_else(|| anyhow!("unknown job {id}"))?;
        state.check_writable(&external_id)?;
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == id) {
            job.title = refresh.title.clone();
            job.description = refresh.description.clone();
            job.salary_min = refresh.salary_min;
            job.salary_max = refresh.salary_max;
            job.apply_url = refresh.apply_url.clone();
            job.scraped_at = refresh.scraped_at;
            job.updated_at = refresh.scraped_at;
            job.is_active = true;
        }
        Ok(())
    }

    async fn count_active_jobs(&self, source_id: Uuid) -> anyhow::Result<i64> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .filter(|j| j.source_id == source_id && j.is_active)
            .count()
            .try_into()
            .unwrap_or(i64::MAX))
    }

    async fn metric_ids_by_key(
        &self,
        keys: &[MetricKey],
    ) -> anyhow::Result<HashMap<MetricKey, Uuid>> {
        let wanted: HashSet<&MetricKey> = keys.iter().collect();
        let state = self.state.lock().await;
        Ok(state
            .metrics
            .iter()
            .map(|m| (m.key(), m.id))
            .filter(|(key, _)| wanted.contains(key))
            .collect())
    }

    async fn upsert_metric(&self, metric: &Metric) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        let key = metric.key();
        match state.metrics.iter().position(|m| m.key() == key) {
            Some(idx) => {
                let existing = &mut state.metrics[idx];
                existing.value = metric.value;
                existing.unit = metric.unit.clone();
                existing.updated_at = metric.updated_at;
            }
            None => state.metrics.push(metric.clone()),
        }
        Ok(())
    }

    async fn surcharge_ids_by_key(
        &self,
        keys: &[SurchargeKey],
    ) -> anyhow::Result<HashMap<SurchargeKey, Uuid>> {
        let wanted: HashSet<&SurchargeKey> = keys.iter().collect();
        let state = self.state.lock().await;
        Ok(state
            .surcharges
            .iter()
            .map(|s| (s.key(), s.id))
            .filter(|(key, _)| wanted.contains(key))
            .collect())
    }

    async fn upsert_surcharge(&self, surcharge: &FuelSurcharge) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        let key = surcharge.key();
        match state.surcharges.iter().position(|s| s.key() == key) {
            Some(idx) => {
                let existing = &mut state.surcharges[idx];
                existing.surcharge_rate = surcharge.surcharge_rate;
                existing.fuel_price = surcharge.fuel_price;
                existing.updated_at = surcharge.updated_at;
            }
            None => state.surcharges.push(surcharge.clone()),
        }
        Ok(())
    }

    async fn advisory_ids_by_key(
        &self,
        railroads: &[String],
        external_ids: &[String],
    ) -> anyhow::Result<HashMap<OrgKey, Uuid>> {
        let state = self.state.lock().await;
        Ok(state
            .advisories
            .iter()
            .filter(|a| railroads.contains(&a.railroad) && external_ids.contains(&a.external_id))
            .map(|a| (a.key(), a.id))
            .collect())
    }

    async fn insert_advisory(&self, advisory: &Advisory) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.check_writable(&advisory.external_id)?;
        let key = advisory.key();
        if let Some(existing) = state.advisories.iter_mut().find(|a| a.key() == key) {
            existing.title = advisory.title.clone();
            existing.description = advisory.description.clone();
            existing.affected_area = advisory.affected_area.clone();
            existing.expires_at = advisory.expires_at;
            existing.is_active = true;
            existing.updated_at = advisory.updated_at;
            return Ok(());
        }
        if state.advisories.iter().any(|a| a.slug == advisory.slug) {
            bail!("advisory slug {} already taken", advisory.slug);
        }
        state.advisories.push(advisory.clone());
        Ok(())
    }

    async fn refresh_advisory(&self, id: Uuid, refresh: &AdvisoryRefresh) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        let advisory = state
            .advisories
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| anyhow!("unknown advisory {id}"))?;
        advisory.title = refresh.title.clone();
        advisory.description = refresh.description.clone();
        advisory.affected_area = refresh.affected_area.clone();
        advisory.expires_at = refresh.expires_at;
        advisory.updated_at = refresh.updated_at;
        advisory.is_active = true;
        Ok(())
    }

    async fn regulatory_ids_by_key(
        &self,
        agencies: &[String],
        external_ids: &[String],
    ) -> anyhow::Result<HashMap<OrgKey, Uuid>> {
        let state = self.state.lock().await;
        Ok(state
            .regulatory
            .iter()
            .filter(|u| {
                agencies.iter().any(|a| a == u.agency.as_str())
                    && external_ids.contains(&u.external_id)
            })
            .map(|u| (u.key(), u.id))
            .collect())
    }

    async fn insert_regulatory(&self, update: &RegulatoryUpdate) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.check_writable(&update.external_id)?;
        let key = update.key();
        match state.regulatory.iter_mut().find(|u| u.key() == key) {
            Some(existing) => {
                existing.title = update.title.clone();
                existing.summary = update.summary.clone();
                existing.content = update.content.clone();
                existing.document_url = update.document_url.clone();
                existing.updated_at = update.updated_at;
            }
            None => state.regulatory.push(update.clone()),
        }
        Ok(())
    }

    async fn refresh_regulatory(
        &self,
        id: Uuid,
        refresh: &RegulatoryRefresh,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        let update = state
            .regulatory
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| anyhow!("unknown regulatory update {id}"))?;
        update.title = refresh.title.clone();
        update.summary = refresh.summary.clone();
        update.content = refresh.content.clone();
        update.document_url = refresh.document_url.clone();
        update.updated_at = refresh.updated_at;
        Ok(())
    }

    async fn facility_ids_by_external_id(
        &self,
        external_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Uuid>> {
        let state = self.state.lock().await;
        Ok(state
            .facilities
            .iter()
            .filter(|f| external_ids.contains(&f.external_id))
            .map(|f| (f.external_id.clone(), f.id))
            .collect())
    }

    async fn insert_facility(&self, facility: &Facility) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.check_writable(&facility.external_id)?;
        if state
            .facilities
            .iter()
            .any(|f| f.external_id == facility.external_id)
        {
            bail!("facility {} already exists", facility.external_id);
        }
        state.facilities.push(facility.clone());
        Ok(())
    }

    async fn update_facility(
        &self,
        id: Uuid,
        draft: &FacilityDraft,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.check_writable(&draft.external_id)?;
        let facility = state
            .facilities
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| anyhow!("unknown facility {id}"))?;
        facility.name = draft.name.clone();
        facility.description = draft.description.clone();
        facility.phone = draft.phone.clone();
        facility.website = draft.website.clone();
        facility.about = draft.about.clone();
        facility.facility_type = draft.facility_type;
        facility.location = draft.location.clone();
        facility.capabilities = draft.capabilities.clone();
        facility.railroads = draft.railroads.clone();
        facility.updated_at = now;
        Ok(())
    }

    async fn expire_jobs(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let mut state = self.state.lock().await;
        let mut expired = 0;
        for job in state.jobs.iter_mut().filter(|j| j.is_active) {
            let past_expiry = job.expires_at.is_some_and(|at| at < now);
            if past_expiry || job.posted_at < stale_before {
                job.is_active = false;
                job.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn expire_advisories(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut state = self.state.lock().await;
        let mut expired = 0;
        for advisory in state.advisories.iter_mut().filter(|a| a.is_active) {
            if advisory.expires_at.is_some_and(|at| at < now) {
                advisory.is_active = false;
                advisory.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railhub_core::{
        AdvisoryType, RawAdvisory, RawRegulatoryUpdate, RegulatoryAgency, RunStatus, SourceCounts,
        UpdateType,
    };

    #[tokio::test]
    async fn sources_are_upserted_by_name() {
        let store = MemoryStore::new();
        let a = store
            .upsert_source("BNSF Customer Notifications", SourceKind::Scraper, "https://www.bnsf.com")
            .await
            .unwrap();
        let b = store
            .upsert_source("BNSF Customer Notifications", SourceKind::Scraper, "https://www.bnsf.com")
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.sources().await.len(), 1);
    }

    #[tokio::test]
    async fn ledger_entries_close_exactly_once() {
        let store = MemoryStore::new();
        let mut entry = RunLedgerEntry::start(Uuid::new_v4(), Utc::now());
        store.open_run(&entry).await.unwrap();

        entry.complete(SourceCounts::found(0), Utc::now());
        store.close_run(&entry).await.unwrap();
        assert!(store.close_run(&entry).await.is_err());

        let ledger = store.ledger().await;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].status, RunStatus::Completed);
    }

    fn raw_advisory(title: &str) -> RawAdvisory {
        RawAdvisory {
            external_id: "E-991".into(),
            railroad: "BNSF".into(),
            advisory_type: AdvisoryType::Embargo,
            title: title.into(),
            description: title.into(),
            affected_area: None,
            issued_at: Utc::now(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn inserting_a_known_advisory_key_updates_in_place() {
        let store = MemoryStore::new();
        let source = Uuid::new_v4();
        let first = Advisory::from_raw(&raw_advisory("Embargo"), source, "bnsf-embargo-a1".into(), Utc::now());
        store.insert_advisory(&first).await.unwrap();
        store.state.lock().await.advisories[0].is_active = false;

        let racing = Advisory::from_raw(
            &raw_advisory("Embargo (Lifted)"),
            source,
            "bnsf-embargo-lifted-b2".into(),
            Utc::now(),
        );
        store.insert_advisory(&racing).await.unwrap();

        let advisories = store.advisories().await;
        assert_eq!(advisories.len(), 1);
        assert_eq!(advisories[0].id, first.id);
        assert_eq!(advisories[0].slug, "bnsf-embargo-a1");
        assert_eq!(advisories[0].title, "Embargo (Lifted)");
        assert!(advisories[0].is_active);
    }

    #[tokio::test]
    async fn inserting_a_known_regulatory_key_updates_in_place() {
        let store = MemoryStore::new();
        let raw = |title: &str| RawRegulatoryUpdate {
            external_id: "fra-BN0224001".into(),
            agency: RegulatoryAgency::Fra,
            update_type: UpdateType::SafetyAlert,
            title: title.into(),
            summary: "Derailment near Galesburg".into(),
            content: None,
            document_url: None,
            docket_number: None,
            published_at: Utc::now(),
        };
        let source = Uuid::new_v4();
        let first = RegulatoryUpdate::from_raw(&raw("Derailment"), source, "fra-derailment-a1".into(), Utc::now());
        let racing = RegulatoryUpdate::from_raw(&raw("Derailment - BNSF"), source, "fra-derailment-b2".into(), Utc::now());
        store.insert_regulatory(&first).await.unwrap();
        store.insert_regulatory(&racing).await.unwrap();

        let stored = store.regulatory().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, first.id);
        assert_eq!(stored[0].title, "Derailment - BNSF");
    }

    #[tokio::test]
    async fn poisoned_external_ids_reject_writes() {
        let store = MemoryStore::new();
        store.fail_writes_for("bad-1").await;
        let state = store.state.lock().await;
        assert!(state.check_writable("bad-1").is_err());
        assert!(state.check_writable("ok-1").is_ok());
    }
}
