pub mod bnsf_advisories;
pub mod bnsf_careers;
pub mod csx_careers;
pub mod csx_embargoes;
pub mod fra_safety;
pub mod fuel_surcharges;
pub mod jsearch;
pub mod norfolk_southern;
pub mod successfactors;
pub mod usda_metrics;

use chrono::{DateTime, Utc};
use railhub_core::RawJob;

/// A job carrying only what every careers listing has; adapters fill the rest.
pub(crate) fn listing_job(
    external_id: impl Into<String>,
    title: impl Into<String>,
    company: &str,
    apply_url: impl Into<String>,
    posted_at: DateTime<Utc>,
) -> RawJob {
    RawJob {
        external_id: external_id.into(),
        title: title.into(),
        company: company.to_string(),
        city: None,
        state: None,
        country: Some("US".to_string()),
        work_mode: None,
        job_type: None,
        category: None,
        experience_level: None,
        salary_min: None,
        salary_max: None,
        salary_period: None,
        description: String::new(),
        apply_url: apply_url.into(),
        posted_at,
        expires_at: None,
    }
}

/// Cuts `value` to at most `max` characters.
pub(crate) fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
