use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use railhub_core::{
    Advisory, AdvisoryRefresh, Facility, FacilityDraft, FeedSource, FuelSurcharge, Job, JobRefresh,
    Metric, MetricKey, MetricType, OrgKey, RegulatoryRefresh, RegulatoryUpdate, RunLedgerEntry,
    SourceKind, SurchargeKey,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::store::Store;

/// `Store` over Postgres. Every insert is an `ON CONFLICT` upsert on the
/// table's business key.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("applying migrations")?;
        info!("migrations applied");
        Ok(())
    }
}

fn distinct<T: Clone + Eq + std::hash::Hash>(values: impl Iterator<Item = T>) -> Vec<T> {
    values.collect::<HashSet<_>>().into_iter().collect()
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_source(
        &self,
        name: &str,
        kind: SourceKind,
        base_url: &str,
    ) -> anyhow::Result<FeedSource> {
        let row = sqlx::query(
            r#"
            INSERT INTO sources (id, name, kind, base_url)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE
               SET base_url = EXCLUDED.base_url
            RETURNING id, name, kind, base_url, last_fetch_at, total_records, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(kind.as_str())
        .bind(base_url)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("upserting source {name}"))?;

        let kind: String = row.try_get("kind")?;
        Ok(FeedSource {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            kind: SourceKind::parse(&kind).ok_or_else(|| anyhow!("unknown source kind {kind}"))?,
            base_url: row.try_get("base_url")?,
            last_fetch_at: row.try_get("last_fetch_at")?,
            total_records: row.try_get("total_records")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn record_source_fetch(
        &self,
        source_id: Uuid,
        fetched_at: DateTime<Utc>,
        total_records: i64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE sources
               SET last_fetch_at = $2,
                   total_records = $3
             WHERE id = $1
            "#,
        )
        .bind(source_id)
        .bind(fetched_at)
        .bind(total_records)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn open_run(&self, entry: &RunLedgerEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO run_ledger (id, source_id, status, started_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.id)
        .bind(entry.source_id)
        .bind(entry.status.as_str())
        .bind(entry.started_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close_run(&self, entry: &RunLedgerEntry) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE run_ledger
               SET status = $2,
                   completed_at = $3,
                   records_found = $4,
                   records_created = $5,
                   records_updated = $6,
                   records_failed = $7,
                   error_message = $8
             WHERE id = $1
               AND status = 'RUNNING'
            "#,
        )
        .bind(entry.id)
        .bind(entry.status.as_str())
        .bind(entry.completed_at)
        .bind(entry.counts.found as i32)
        .bind(entry.counts.created as i32)
        .bind(entry.counts.updated as i32)
        .bind(entry.counts.failed as i32)
        .bind(entry.error_message.as_deref())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("ledger entry {} is not open", entry.id));
        }
        Ok(())
    }

    async fn job_ids_by_external_id(
        &self,
        source_id: Uuid,
        external_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Uuid>> {
        let rows = sqlx::query(
            "SELECT id, external_id FROM jobs WHERE source_id = $1 AND external_id = ANY($2)",
        )
        .bind(source_id)
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            out.insert(row.try_get("external_id")?, row.try_get("id")?);
        }
        Ok(out)
    }

    async fn job_fingerprints(&self, fingerprints: &[String]) -> anyhow::Result<HashSet<String>> {
        let rows = sqlx::query("SELECT DISTINCT content_hash FROM jobs WHERE content_hash = ANY($1)")
            .bind(fingerprints)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| row.try_get::<String, _>("content_hash").map_err(anyhow::Error::from))
            .collect()
    }

    async fn insert_job(&self, job: &Job) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, source_id, external_id, content_hash, slug, title, company, company_slug,
                city, state, country, work_mode, job_type, category, experience_level,
                salary_min, salary_max, salary_period, description, apply_url,
                posted_at, expires_at, scraped_at, is_active, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26
            )
            ON CONFLICT (source_id, external_id) DO UPDATE
               SET title = EXCLUDED.title,
                   description = EXCLUDED.description,
                   salary_min = EXCLUDED.salary_min,
                   salary_max = EXCLUDED.salary_max,
                   apply_url = EXCLUDED.apply_url,
                   scraped_at = EXCLUDED.scraped_at,
                   is_active = TRUE,
                   updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(job.id)
        .bind(job.source_id)
        .bind(&job.external_id)
        .bind(&job.content_hash)
        .bind(&job.slug)
        .bind(&job.title)
        .bind(&job.company)
        .bind(&job.company_slug)
        .bind(job.city.as_deref())
        .bind(job.state.as_deref())
        .bind(&job.country)
        .bind(job.work_mode.as_str())
        .bind(job.job_type.as_str())
        .bind(job.category.map(|c| c.label()))
        .bind(job.experience_level.map(|e| e.as_str()))
        .bind(job.salary_min)
        .bind(job.salary_max)
        .bind(job.salary_period.map(|p| p.as_str()))
        .bind(&job.description)
        .bind(&job.apply_url)
        .bind(job.posted_at)
        .bind(job.expires_at)
        .bind(job.scraped_at)
        .bind(job.is_active)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting job {}", job.external_id))?;
        Ok(())
    }

    async fn refresh_job(&self, id: Uuid, refresh: &JobRefresh) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
               SET title = $2,
                   description = $3,
                   salary_min = $4,
                   salary_max = $5,
                   apply_url = $6,
                   scraped_at = $7,
                   updated_at = $7,
                   is_active = TRUE
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&refresh.title)
        .bind(&refresh.description)
        .bind(refresh.salary_min)
        .bind(refresh.salary_max)
        .bind(&refresh.apply_url)
        .bind(refresh.scraped_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_active_jobs(&self, source_id: Uuid) -> anyhow::Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS active FROM jobs WHERE source_id = $1 AND is_active = TRUE",
        )
        .bind(source_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("active")?)
    }

    async fn metric_ids_by_key(
        &self,
        keys: &[MetricKey],
    ) -> anyhow::Result<HashMap<MetricKey, Uuid>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let wanted: HashSet<&MetricKey> = keys.iter().collect();
        let railroads = distinct(keys.iter().map(|k| k.railroad.clone()));
        let weeks: Vec<NaiveDate> = distinct(keys.iter().map(|k| k.report_week));

        let rows = sqlx::query(
            r#"
            SELECT id, railroad, metric_type, report_week, commodity
              FROM rail_metrics
             WHERE railroad = ANY($1)
               AND report_week = ANY($2)
            "#,
        )
        .bind(&railroads)
        .bind(&weeks)
        .fetch_all(&self.pool)
        .await?;

        let mut out = HashMap::new();
        for row in rows {
            let metric_type: String = row.try_get("metric_type")?;
            let Some(metric_type) = MetricType::parse(&metric_type) else {
                continue;
            };
            let key = MetricKey {
                railroad: row.try_get("railroad")?,
                metric_type,
                report_week: row.try_get("report_week")?,
                commodity: row.try_get("commodity")?,
            };
            if wanted.contains(&key) {
                out.insert(key, row.try_get("id")?);
            }
        }
        Ok(out)
    }

    async fn upsert_metric(&self, metric: &Metric) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rail_metrics (
                id, source_id, railroad, metric_type, value, unit, report_week, commodity,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (railroad, metric_type, report_week, commodity) DO UPDATE
               SET value = EXCLUDED.value,
                   unit = EXCLUDED.unit,
                   updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(metric.id)
        .bind(metric.source_id)
        .bind(&metric.railroad)
        .bind(metric.metric_type.as_str())
        .bind(metric.value)
        .bind(&metric.unit)
        .bind(metric.report_week)
        .bind(&metric.commodity)
        .bind(metric.created_at)
        .bind(metric.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn surcharge_ids_by_key(
        &self,
        keys: &[SurchargeKey],
    ) -> anyhow::Result<HashMap<SurchargeKey, Uuid>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let wanted: HashSet<&SurchargeKey> = keys.iter().collect();
        let railroads = distinct(keys.iter().map(|k| k.railroad.clone()));
        let dates: Vec<NaiveDate> = distinct(keys.iter().map(|k| k.effective_date));

        let rows = sqlx::query(
            r#"
            SELECT id, railroad, effective_date, traffic_type
              FROM fuel_surcharges
             WHERE railroad = ANY($1)
               AND effective_date = ANY($2)
            "#,
        )
        .bind(&railroads)
        .bind(&dates)
        .fetch_all(&self.pool)
        .await?;

        let mut out = HashMap::new();
        for row in rows {
            let key = SurchargeKey {
                railroad: row.try_get("railroad")?,
                effective_date: row.try_get("effective_date")?,
                traffic_type: row.try_get("traffic_type")?,
            };
            if wanted.contains(&key) {
                out.insert(key, row.try_get("id")?);
            }
        }
        Ok(out)
    }

    async fn upsert_surcharge(&self, surcharge: &FuelSurcharge) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fuel_surcharges (
                id, source_id, railroad, effective_date, fuel_price, surcharge_rate,
                traffic_type, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (railroad, effective_date, traffic_type) DO UPDATE
               SET fuel_price = EXCLUDED.fuel_price,
                   surcharge_rate = EXCLUDED.surcharge_rate,
                   updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(surcharge.id)
        .bind(surcharge.source_id)
        .bind(&surcharge.railroad)
        .bind(surcharge.effective_date)
        .bind(surcharge.fuel_price)
        .bind(surcharge.surcharge_rate)
        .bind(&surcharge.traffic_type)
        .bind(surcharge.created_at)
        .bind(surcharge.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn advisory_ids_by_key(
        &self,
        railroads: &[String],
        external_ids: &[String],
    ) -> anyhow::Result<HashMap<OrgKey, Uuid>> {
        let rows = sqlx::query(
            "SELECT id, external_id, railroad FROM service_advisories \
             WHERE railroad = ANY($1) AND external_id = ANY($2)",
        )
        .bind(railroads)
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let key = OrgKey::new(
                row.try_get::<String, _>("external_id")?,
                row.try_get::<String, _>("railroad")?,
            );
            out.insert(key, row.try_get("id")?);
        }
        Ok(out)
    }

    async fn insert_advisory(&self, advisory: &Advisory) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO service_advisories (
                id, source_id, external_id, slug, railroad, advisory_type, title, description,
                affected_area, issued_at, expires_at, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (external_id, railroad) DO UPDATE
               SET title = EXCLUDED.title,
                   description = EXCLUDED.description,
                   affected_area = EXCLUDED.affected_area,
                   expires_at = EXCLUDED.expires_at,
                   is_active = TRUE,
                   updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(advisory.id)
        .bind(advisory.source_id)
        .bind(&advisory.external_id)
        .bind(&advisory.slug)
        .bind(&advisory.railroad)
        .bind(advisory.advisory_type.as_str())
        .bind(&advisory.title)
        .bind(&advisory.description)
        .bind(advisory.affected_area.as_deref())
        .bind(advisory.issued_at)
        .bind(advisory.expires_at)
        .bind(advisory.is_active)
        .bind(advisory.created_at)
        .bind(advisory.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting advisory {}", advisory.external_id))?;
        Ok(())
    }

    async fn refresh_advisory(&self, id: Uuid, refresh: &AdvisoryRefresh) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE service_advisories
               SET title = $2,
                   description = $3,
                   affected_area = $4,
                   expires_at = $5,
                   updated_at = $6,
                   is_active = TRUE
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&refresh.title)
        .bind(&refresh.description)
        .bind(refresh.affected_area.as_deref())
        .bind(refresh.expires_at)
        .bind(refresh.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn regulatory_ids_by_key(
        &self,
        agencies: &[String],
        external_ids: &[String],
    ) -> anyhow::Result<HashMap<OrgKey, Uuid>> {
        let rows = sqlx::query(
            "SELECT id, external_id, agency FROM regulatory_updates \
             WHERE agency = ANY($1) AND external_id = ANY($2)",
        )
        .bind(agencies)
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let key = OrgKey::new(
                row.try_get::<String, _>("external_id")?,
                row.try_get::<String, _>("agency")?,
            );
            out.insert(key, row.try_get("id")?);
        }
        Ok(out)
    }

    async fn insert_regulatory(&self, update: &RegulatoryUpdate) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO regulatory_updates (
                id, source_id, external_id, slug, agency, update_type, title, summary,
                content, document_url, docket_number, published_at, is_active,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (external_id, agency) DO UPDATE
               SET title = EXCLUDED.title,
                   summary = EXCLUDED.summary,
                   content = EXCLUDED.content,
                   document_url = EXCLUDED.document_url,
                   updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(update.id)
        .bind(update.source_id)
        .bind(&update.external_id)
        .bind(&update.slug)
        .bind(update.agency.as_str())
        .bind(update.update_type.as_str())
        .bind(&update.title)
        .bind(&update.summary)
        .bind(update.content.as_deref())
        .bind(update.document_url.as_deref())
        .bind(update.docket_number.as_deref())
        .bind(update.published_at)
        .bind(update.is_active)
        .bind(update.created_at)
        .bind(update.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting regulatory update {}", update.external_id))?;
        Ok(())
    }

    async fn refresh_regulatory(
        &self,
        id: Uuid,
        refresh: &RegulatoryRefresh,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE regulatory_updates
               SET title = $2,
                   summary = $3,
                   content = $4,
                   document_url = $5,
                   updated_at = $6
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&refresh.title)
        .bind(&refresh.summary)
        .bind(refresh.content.as_deref())
        .bind(refresh.document_url.as_deref())
        .bind(refresh.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn facility_ids_by_external_id(
        &self,
        external_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Uuid>> {
        let rows = sqlx::query("SELECT id, external_id FROM facilities WHERE external_id = ANY($1)")
            .bind(external_ids)
            .fetch_all(&self.pool)
            .await?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            out.insert(row.try_get("external_id")?, row.try_get("id")?);
        }
        Ok(out)
    }

    async fn insert_facility(&self, facility: &Facility) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO facilities (
                id, source_id, external_id, name, description, phone, website, about,
                facility_type, location, capabilities, railroads, is_active,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(facility.id)
        .bind(facility.source_id)
        .bind(&facility.external_id)
        .bind(&facility.name)
        .bind(facility.description.as_deref())
        .bind(facility.phone.as_deref())
        .bind(facility.website.as_deref())
        .bind(facility.about.as_deref())
        .bind(facility.facility_type.as_str())
        .bind(Json(&facility.location))
        .bind(Json(&facility.capabilities))
        .bind(&facility.railroads)
        .bind(facility.is_active)
        .bind(facility.created_at)
        .bind(facility.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting facility {}", facility.external_id))?;
        Ok(())
    }

    async fn update_facility(
        &self,
        id: Uuid,
        draft: &FacilityDraft,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE facilities
               SET name = $2,
                   description = $3,
                   phone = $4,
                   website = $5,
                   about = $6,
                   facility_type = $7,
                   location = $8,
                   capabilities = $9,
                   railroads = $10,
                   updated_at = $11
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&draft.name)
        .bind(draft.description.as_deref())
        .bind(draft.phone.as_deref())
        .bind(draft.website.as_deref())
        .bind(draft.about.as_deref())
        .bind(draft.facility_type.as_str())
        .bind(Json(&draft.location))
        .bind(Json(&draft.capabilities))
        .bind(&draft.railroads)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("updating facility {}", draft.external_id))?;
        Ok(())
    }

    async fn expire_jobs(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
               SET is_active = FALSE,
                   updated_at = $1
             WHERE is_active = TRUE
               AND ((expires_at IS NOT NULL AND expires_at < $1) OR posted_at < $2)
            "#,
        )
        .bind(now)
        .bind(stale_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn expire_advisories(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE service_advisories
               SET is_active = FALSE,
                   updated_at = $1
             WHERE is_active = TRUE
               AND expires_at IS NOT NULL
               AND expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
