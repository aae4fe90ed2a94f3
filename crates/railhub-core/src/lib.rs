//! Core domain model for the Railhub ingestion pipeline.
//!
//! Raw shapes are what source adapters hand to reconciliation; canonical
//! records are what reconciliation persists. Sources, pipelines and every
//! category-like value are closed enumerations resolved through `match`
//! tables so adding one is a compile-checked change.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod classify;
pub mod identity;

pub const CRATE_NAME: &str = "railhub-core";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    Api,
    Scraper,
    Import,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Api => "API",
            SourceKind::Scraper => "SCRAPER",
            SourceKind::Import => "IMPORT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "API" => Some(SourceKind::Api),
            "SCRAPER" => Some(SourceKind::Scraper),
            "IMPORT" => Some(SourceKind::Import),
            _ => None,
        }
    }
}

/// Which canonical record shape a batch or source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Metric,
    FuelSurcharge,
    Advisory,
    Regulatory,
    Job,
    Facility,
}

/// Every external origin the pipelines know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceId {
    CsxCareers,
    AmtrakCareers,
    NorfolkSouthernCareers,
    UnionPacificCareers,
    BnsfCareers,
    Jsearch,
    UsdaRailMetrics,
    FuelSurcharges,
    BnsfAdvisories,
    CsxEmbargoes,
    FraSafety,
}

impl SourceId {
    pub const ALL: [SourceId; 11] = [
        SourceId::CsxCareers,
        SourceId::AmtrakCareers,
        SourceId::NorfolkSouthernCareers,
        SourceId::UnionPacificCareers,
        SourceId::BnsfCareers,
        SourceId::Jsearch,
        SourceId::UsdaRailMetrics,
        SourceId::FuelSurcharges,
        SourceId::BnsfAdvisories,
        SourceId::CsxEmbargoes,
        SourceId::FraSafety,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            SourceId::CsxCareers => "csx-careers",
            SourceId::AmtrakCareers => "amtrak-careers",
            SourceId::NorfolkSouthernCareers => "norfolk-southern-careers",
            SourceId::UnionPacificCareers => "union-pacific-careers",
            SourceId::BnsfCareers => "bnsf-careers",
            SourceId::Jsearch => "jsearch",
            SourceId::UsdaRailMetrics => "usda-rail-metrics",
            SourceId::FuelSurcharges => "fuel-surcharges",
            SourceId::BnsfAdvisories => "bnsf-advisories",
            SourceId::CsxEmbargoes => "csx-embargoes",
            SourceId::FraSafety => "fra-safety",
        }
    }

    /// Unique source name; the store upserts sources by this value.
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceId::CsxCareers => "CSX Careers",
            SourceId::AmtrakCareers => "Amtrak Careers",
            SourceId::NorfolkSouthernCareers => "Norfolk Southern Careers",
            SourceId::UnionPacificCareers => "Union Pacific Careers",
            SourceId::BnsfCareers => "BNSF Careers",
            SourceId::Jsearch => "JSearch",
            SourceId::UsdaRailMetrics => "USDA Rail Metrics",
            SourceId::FuelSurcharges => "Fuel Surcharges (All Carriers)",
            SourceId::BnsfAdvisories => "BNSF Customer Notifications",
            SourceId::CsxEmbargoes => "CSX Embargoes",
            SourceId::FraSafety => "FRA Safety Data",
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SourceId::CsxCareers
            | SourceId::Jsearch
            | SourceId::UsdaRailMetrics
            | SourceId::FuelSurcharges
            | SourceId::FraSafety => SourceKind::Api,
            SourceId::AmtrakCareers
            | SourceId::NorfolkSouthernCareers
            | SourceId::UnionPacificCareers
            | SourceId::BnsfCareers
            | SourceId::BnsfAdvisories
            | SourceId::CsxEmbargoes => SourceKind::Scraper,
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            SourceId::CsxCareers => {
                "https://fa-eowa-saasfaprod1.fa.ocs.oraclecloud.com/hcmUI/CandidateExperience/en/sites/CSXCareers"
            }
            SourceId::AmtrakCareers => "https://careers.amtrak.com",
            SourceId::NorfolkSouthernCareers => "https://jobs.nscorp.com",
            SourceId::UnionPacificCareers => "https://up.jobs",
            SourceId::BnsfCareers => "https://jobs.bnsf.com",
            SourceId::Jsearch => "https://jsearch.p.rapidapi.com",
            SourceId::UsdaRailMetrics => "https://agtransport.usda.gov",
            SourceId::FuelSurcharges => "https://www.eia.gov",
            SourceId::BnsfAdvisories => "https://www.bnsf.com",
            SourceId::CsxEmbargoes => "https://www.csx.com",
            SourceId::FraSafety => "https://data.transportation.gov",
        }
    }

    pub fn domain(&self) -> Domain {
        match self {
            SourceId::CsxCareers
            | SourceId::AmtrakCareers
            | SourceId::NorfolkSouthernCareers
            | SourceId::UnionPacificCareers
            | SourceId::BnsfCareers
            | SourceId::Jsearch => Domain::Job,
            SourceId::UsdaRailMetrics => Domain::Metric,
            SourceId::FuelSurcharges => Domain::FuelSurcharge,
            SourceId::BnsfAdvisories | SourceId::CsxEmbargoes => Domain::Advisory,
            SourceId::FraSafety => Domain::Regulatory,
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        match self.domain() {
            Domain::Job => Pipeline::Jobs,
            Domain::Regulatory => Pipeline::Regulatory,
            _ => Pipeline::Industry,
        }
    }
}

/// One independently triggered, time-budgeted ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    Jobs,
    Industry,
    Regulatory,
}

impl Pipeline {
    pub const ALL: [Pipeline; 3] = [Pipeline::Jobs, Pipeline::Industry, Pipeline::Regulatory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::Jobs => "jobs",
            Pipeline::Industry => "industry",
            Pipeline::Regulatory => "regulatory",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Pipeline::ALL.into_iter().find(|p| p.as_str() == value)
    }

    /// Declaration order is processing order.
    pub fn sources(&self) -> &'static [SourceId] {
        match self {
            Pipeline::Jobs => &[
                SourceId::CsxCareers,
                SourceId::AmtrakCareers,
                SourceId::NorfolkSouthernCareers,
                SourceId::UnionPacificCareers,
                SourceId::BnsfCareers,
                SourceId::Jsearch,
            ],
            Pipeline::Industry => &[
                SourceId::UsdaRailMetrics,
                SourceId::FuelSurcharges,
                SourceId::BnsfAdvisories,
                SourceId::CsxEmbargoes,
            ],
            Pipeline::Regulatory => &[SourceId::FraSafety],
        }
    }

    /// Domains whose validity window the post-run sweep enforces.
    pub fn expiring_domains(&self) -> &'static [Domain] {
        match self {
            Pipeline::Jobs => &[Domain::Job],
            Pipeline::Industry => &[Domain::Advisory],
            Pipeline::Regulatory => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricType {
    TrainSpeed,
    TerminalDwell,
    CarsOnLine,
    CarloadsOriginated,
    IntermodalVolume,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::TrainSpeed => "TRAIN_SPEED",
            MetricType::TerminalDwell => "TERMINAL_DWELL",
            MetricType::CarsOnLine => "CARS_ON_LINE",
            MetricType::CarloadsOriginated => "CARLOADS_ORIGINATED",
            MetricType::IntermodalVolume => "INTERMODAL_VOLUME",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            MetricType::TrainSpeed,
            MetricType::TerminalDwell,
            MetricType::CarsOnLine,
            MetricType::CarloadsOriginated,
            MetricType::IntermodalVolume,
        ]
        .into_iter()
        .find(|m| m.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvisoryType {
    Embargo,
    ServiceAlert,
    WeatherAdvisory,
    MaintenanceNotice,
}

impl AdvisoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvisoryType::Embargo => "EMBARGO",
            AdvisoryType::ServiceAlert => "SERVICE_ALERT",
            AdvisoryType::WeatherAdvisory => "WEATHER_ADVISORY",
            AdvisoryType::MaintenanceNotice => "MAINTENANCE_NOTICE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegulatoryAgency {
    Stb,
    Fra,
    Phmsa,
    Aar,
}

impl RegulatoryAgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegulatoryAgency::Stb => "STB",
            RegulatoryAgency::Fra => "FRA",
            RegulatoryAgency::Phmsa => "PHMSA",
            RegulatoryAgency::Aar => "AAR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateType {
    #[serde(rename = "Safety Alert")]
    SafetyAlert,
    #[serde(rename = "Data Release")]
    DataRelease,
    Ruling,
    Notice,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::SafetyAlert => "Safety Alert",
            UpdateType::DataRelease => "Data Release",
            UpdateType::Ruling => "Ruling",
            UpdateType::Notice => "Notice",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    FullTime,
    PartTime,
    Contract,
    Internship,
    Temporary,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FullTime => "FULL_TIME",
            JobType::PartTime => "PART_TIME",
            JobType::Contract => "CONTRACT",
            JobType::Internship => "INTERNSHIP",
            JobType::Temporary => "TEMPORARY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkMode {
    Onsite,
    Remote,
    Hybrid,
}

impl WorkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkMode::Onsite => "ONSITE",
            WorkMode::Remote => "REMOTE",
            WorkMode::Hybrid => "HYBRID",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperienceLevel {
    Entry,
    Mid,
    Senior,
    Executive,
}

impl ExperienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::Entry => "ENTRY",
            ExperienceLevel::Mid => "MID",
            ExperienceLevel::Senior => "SENIOR",
            ExperienceLevel::Executive => "EXECUTIVE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SalaryPeriod {
    Yearly,
    Hourly,
}

impl SalaryPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SalaryPeriod::Yearly => "YEARLY",
            SalaryPeriod::Hourly => "HOURLY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FacilityType {
    Transload,
    Storage,
}

impl FacilityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacilityType::Transload => "TRANSLOAD",
            FacilityType::Storage => "STORAGE",
        }
    }
}

pub use classify::JobCategory;

// ---------------------------------------------------------------------------
// Raw shapes (adapter output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetric {
    pub railroad: String,
    pub metric_type: MetricType,
    pub value: f64,
    pub unit: String,
    pub report_week: NaiveDate,
    pub commodity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricKey {
    pub railroad: String,
    pub metric_type: MetricType,
    pub report_week: NaiveDate,
    pub commodity: String,
}

impl RawMetric {
    pub fn key(&self) -> MetricKey {
        MetricKey {
            railroad: self.railroad.clone(),
            metric_type: self.metric_type,
            report_week: self.report_week,
            commodity: self.commodity.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFuelSurcharge {
    pub railroad: String,
    pub effective_date: NaiveDate,
    pub fuel_price: Option<f64>,
    pub surcharge_rate: f64,
    pub traffic_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurchargeKey {
    pub railroad: String,
    pub effective_date: NaiveDate,
    pub traffic_type: String,
}

impl RawFuelSurcharge {
    pub fn key(&self) -> SurchargeKey {
        SurchargeKey {
            railroad: self.railroad.clone(),
            effective_date: self.effective_date,
            traffic_type: self.traffic_type.clone().unwrap_or_default(),
        }
    }
}

/// `externalId` scoped to its issuing organisation (railroad or agency).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrgKey {
    pub external_id: String,
    pub org: String,
}

impl OrgKey {
    pub fn new(external_id: impl Into<String>, org: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            org: org.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAdvisory {
    pub external_id: String,
    pub railroad: String,
    pub advisory_type: AdvisoryType,
    pub title: String,
    pub description: String,
    pub affected_area: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl RawAdvisory {
    pub fn key(&self) -> OrgKey {
        OrgKey::new(&self.external_id, &self.railroad)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRegulatoryUpdate {
    pub external_id: String,
    pub agency: RegulatoryAgency,
    pub update_type: UpdateType,
    pub title: String,
    pub summary: String,
    pub content: Option<String>,
    pub document_url: Option<String>,
    pub docket_number: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl RawRegulatoryUpdate {
    pub fn key(&self) -> OrgKey {
        OrgKey::new(&self.external_id, self.agency.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawJob {
    pub external_id: String,
    pub title: String,
    pub company: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub work_mode: Option<WorkMode>,
    pub job_type: Option<JobType>,
    pub category: Option<JobCategory>,
    pub experience_level: Option<ExperienceLevel>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub salary_period: Option<SalaryPeriod>,
    pub description: String,
    pub apply_url: String,
    pub posted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl RawJob {
    /// Fingerprint used for cross-source duplicate detection.
    pub fn fingerprint(&self) -> String {
        identity::content_fingerprint(&self.title, &self.company, self.city.as_deref())
    }
}

/// Output of one adapter invocation. A batch always holds a single domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "items", rename_all = "snake_case")]
pub enum RawBatch {
    Metrics(Vec<RawMetric>),
    FuelSurcharges(Vec<RawFuelSurcharge>),
    Advisories(Vec<RawAdvisory>),
    Regulatory(Vec<RawRegulatoryUpdate>),
    Jobs(Vec<RawJob>),
}

impl RawBatch {
    pub fn empty(domain: Domain) -> Self {
        match domain {
            Domain::Metric => RawBatch::Metrics(Vec::new()),
            Domain::FuelSurcharge => RawBatch::FuelSurcharges(Vec::new()),
            Domain::Advisory => RawBatch::Advisories(Vec::new()),
            Domain::Regulatory => RawBatch::Regulatory(Vec::new()),
            Domain::Job | Domain::Facility => RawBatch::Jobs(Vec::new()),
        }
    }

    pub fn domain(&self) -> Domain {
        match self {
            RawBatch::Metrics(_) => Domain::Metric,
            RawBatch::FuelSurcharges(_) => Domain::FuelSurcharge,
            RawBatch::Advisories(_) => Domain::Advisory,
            RawBatch::Regulatory(_) => Domain::Regulatory,
            RawBatch::Jobs(_) => Domain::Job,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RawBatch::Metrics(v) => v.len(),
            RawBatch::FuelSurcharges(v) => v.len(),
            RawBatch::Advisories(v) => v.len(),
            RawBatch::Regulatory(v) => v.len(),
            RawBatch::Jobs(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every item whose key repeats an earlier item. Returns how many went.
    pub fn dedup(&mut self) -> usize {
        fn keep_first<T, K: Eq + std::hash::Hash>(items: &mut Vec<T>, key: impl Fn(&T) -> K) -> usize {
            let before = items.len();
            let mut seen = std::collections::HashSet::new();
            items.retain(|item| seen.insert(key(item)));
            before - items.len()
        }
        match self {
            RawBatch::Metrics(v) => keep_first(v, RawMetric::key),
            RawBatch::FuelSurcharges(v) => keep_first(v, RawFuelSurcharge::key),
            RawBatch::Advisories(v) => keep_first(v, RawAdvisory::key),
            RawBatch::Regulatory(v) => keep_first(v, RawRegulatoryUpdate::key),
            RawBatch::Jobs(v) => keep_first(v, |job: &RawJob| job.external_id.clone()),
        }
    }

    /// Appends `other` in order. Returns the offending domain on mismatch.
    pub fn append(&mut self, other: RawBatch) -> Result<(), Domain> {
        match (self, other) {
            (RawBatch::Metrics(a), RawBatch::Metrics(b)) => a.extend(b),
            (RawBatch::FuelSurcharges(a), RawBatch::FuelSurcharges(b)) => a.extend(b),
            (RawBatch::Advisories(a), RawBatch::Advisories(b)) => a.extend(b),
            (RawBatch::Regulatory(a), RawBatch::Regulatory(b)) => a.extend(b),
            (RawBatch::Jobs(a), RawBatch::Jobs(b)) => a.extend(b),
            (_, other) => return Err(other.domain()),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sources and the run ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSource {
    pub id: Uuid,
    pub name: String,
    pub kind: SourceKind,
    pub base_url: String,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub total_records: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceCounts {
    pub found: u32,
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
}

impl SourceCounts {
    pub fn found(found: usize) -> Self {
        Self {
            found: Self::clamp(found),
            ..Self::default()
        }
    }

    /// Narrows a tally to the counter width, saturating at `u32::MAX`.
    pub fn clamp(count: usize) -> u32 {
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    pub fn processed(&self) -> u32 {
        self.created
            .saturating_add(self.updated)
            .saturating_add(self.failed)
    }

    /// `created + updated + failed <= found`
    pub fn is_consistent(&self) -> bool {
        self.processed() <= self.found
    }
}

/// Audit record of one source's participation in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLedgerEntry {
    pub id: Uuid,
    pub source_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counts: SourceCounts,
    pub error_message: Option<String>,
}

impl RunLedgerEntry {
    pub fn start(source_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            status: RunStatus::Running,
            started_at,
            completed_at: None,
            counts: SourceCounts::default(),
            error_message: None,
        }
    }

    pub fn complete(&mut self, counts: SourceCounts, at: DateTime<Utc>) {
        self.status = RunStatus::Completed;
        self.counts = counts;
        self.completed_at = Some(at);
    }

    pub fn fail(&mut self, counts: SourceCounts, message: impl Into<String>, at: DateTime<Utc>) {
        self.status = RunStatus::Failed;
        self.counts = counts;
        self.error_message = Some(message.into());
        self.completed_at = Some(at);
    }
}

// ---------------------------------------------------------------------------
// Canonical records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: Uuid,
    pub source_id: Uuid,
    pub railroad: String,
    pub metric_type: MetricType,
    pub value: f64,
    pub unit: String,
    pub report_week: NaiveDate,
    pub commodity: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Metric {
    pub fn from_raw(raw: &RawMetric, source_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            railroad: raw.railroad.clone(),
            metric_type: raw.metric_type,
            value: raw.value,
            unit: raw.unit.clone(),
            report_week: raw.report_week,
            commodity: raw.commodity.clone().unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> MetricKey {
        MetricKey {
            railroad: self.railroad.clone(),
            metric_type: self.metric_type,
            report_week: self.report_week,
            commodity: self.commodity.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelSurcharge {
    pub id: Uuid,
    pub source_id: Uuid,
    pub railroad: String,
    pub effective_date: NaiveDate,
    pub fuel_price: Option<f64>,
    pub surcharge_rate: f64,
    pub traffic_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FuelSurcharge {
    pub fn from_raw(raw: &RawFuelSurcharge, source_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            railroad: raw.railroad.clone(),
            effective_date: raw.effective_date,
            fuel_price: raw.fuel_price,
            surcharge_rate: raw.surcharge_rate,
            traffic_type: raw.traffic_type.clone().unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> SurchargeKey {
        SurchargeKey {
            railroad: self.railroad.clone(),
            effective_date: self.effective_date,
            traffic_type: self.traffic_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub id: Uuid,
    pub source_id: Uuid,
    pub external_id: String,
    pub slug: String,
    pub railroad: String,
    pub advisory_type: AdvisoryType,
    pub title: String,
    pub description: String,
    pub affected_area: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Advisory {
    pub fn from_raw(raw: &RawAdvisory, source_id: Uuid, slug: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            external_id: raw.external_id.clone(),
            slug,
            railroad: raw.railroad.clone(),
            advisory_type: raw.advisory_type,
            title: raw.title.clone(),
            description: raw.description.clone(),
            affected_area: raw.affected_area.clone(),
            issued_at: raw.issued_at,
            expires_at: raw.expires_at,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> OrgKey {
        OrgKey::new(&self.external_id, &self.railroad)
    }
}

/// Mutable advisory fields refreshed on a key match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRefresh {
    pub title: String,
    pub description: String,
    pub affected_area: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AdvisoryRefresh {
    pub fn from_raw(raw: &RawAdvisory, now: DateTime<Utc>) -> Self {
        Self {
            title: raw.title.clone(),
            description: raw.description.clone(),
            affected_area: raw.affected_area.clone(),
            expires_at: raw.expires_at,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulatoryUpdate {
    pub id: Uuid,
    pub source_id: Uuid,
    pub external_id: String,
    pub slug: String,
    pub agency: RegulatoryAgency,
    pub update_type: UpdateType,
    pub title: String,
    pub summary: String,
    pub content: Option<String>,
    pub document_url: Option<String>,
    pub docket_number: Option<String>,
    pub published_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegulatoryUpdate {
    pub fn from_raw(
        raw: &RawRegulatoryUpdate,
        source_id: Uuid,
        slug: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            external_id: raw.external_id.clone(),
            slug,
            agency: raw.agency,
            update_type: raw.update_type,
            title: raw.title.clone(),
            summary: raw.summary.clone(),
            content: raw.content.clone(),
            document_url: raw.document_url.clone(),
            docket_number: raw.docket_number.clone(),
            published_at: raw.published_at,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> OrgKey {
        OrgKey::new(&self.external_id, self.agency.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulatoryRefresh {
    pub title: String,
    pub summary: String,
    pub content: Option<String>,
    pub document_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RegulatoryRefresh {
    pub fn from_raw(raw: &RawRegulatoryUpdate, now: DateTime<Utc>) -> Self {
        Self {
            title: raw.title.clone(),
            summary: raw.summary.clone(),
            content: raw.content.clone(),
            document_url: raw.document_url.clone(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub source_id: Uuid,
    pub external_id: String,
    pub content_hash: String,
    pub slug: String,
    pub title: String,
    pub company: String,
    pub company_slug: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: String,
    pub work_mode: WorkMode,
    pub job_type: JobType,
    pub category: Option<JobCategory>,
    pub experience_level: Option<ExperienceLevel>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub salary_period: Option<SalaryPeriod>,
    pub description: String,
    pub apply_url: String,
    pub posted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable job fields refreshed on a source-scoped `externalId` match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRefresh {
    pub title: String,
    pub description: String,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub apply_url: String,
    pub scraped_at: DateTime<Utc>,
}

impl JobRefresh {
    pub fn from_raw(raw: &RawJob, now: DateTime<Utc>) -> Self {
        Self {
            title: raw.title.clone(),
            description: raw.description.clone(),
            salary_min: raw.salary_min,
            salary_max: raw.salary_max,
            apply_url: raw.apply_url.clone(),
            scraped_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FacilityLocation {
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FacilityCapabilities {
    pub track_capacity: Option<i32>,
    pub railcar_spot_count: Option<i32>,
    pub hazmat_certified: bool,
    pub food_grade: bool,
    pub kosher_certified: bool,
    pub has_scale: bool,
    pub has_railcar_storage: bool,
    pub is_24_7: bool,
    pub weight_restricted_263k: bool,
    pub weight_restricted_286k: bool,
    pub equipment: Vec<String>,
    pub storage_options: Vec<String>,
    pub transfer_modes: Vec<String>,
    pub product_types: Vec<String>,
    /// Monday first.
    pub hours: [Option<String>; 7],
}

/// Normalized row of a bulk facility import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityDraft {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub about: Option<String>,
    pub facility_type: FacilityType,
    pub location: FacilityLocation,
    pub capabilities: FacilityCapabilities,
    pub railroads: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: Uuid,
    pub source_id: Uuid,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub about: Option<String>,
    pub facility_type: FacilityType,
    pub location: FacilityLocation,
    pub capabilities: FacilityCapabilities,
    pub railroads: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Facility {
    pub fn from_draft(draft: FacilityDraft, source_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            external_id: draft.external_id,
            name: draft.name,
            description: draft.description,
            phone: draft.phone,
            website: draft.website,
            about: draft.about,
            facility_type: draft.facility_type,
            location: draft.location,
            capabilities: draft.capabilities,
            railroads: draft.railroads,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
