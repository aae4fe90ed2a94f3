//! JSearch (RapidAPI) aggregator, one request per rail-industry query.

use chrono::{DateTime, Utc};
use railhub_core::{ExperienceLevel, JobType, RawBatch, RawJob, SalaryPeriod, SourceId, WorkMode};
use railhub_storage::{FetchedPage, PageRequest};
use serde::Deserialize;

use super::listing_job;
use crate::parse::{state_code, text_or_none};
use crate::{AdapterContext, AdapterError, ListingTarget, SourceAdapter};

const RAPIDAPI_HOST: &str = "jsearch.p.rapidapi.com";

const RAIL_QUERIES: &[&str] = &[
    "railroad jobs",
    "rail freight jobs",
    "locomotive engineer",
    "railroad conductor",
    "track maintenance railroad",
    "railcar mechanic",
    "rail yard operations",
    "freight rail logistics",
    "railroad safety compliance",
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<JsearchJob>,
}

#[derive(Debug, Deserialize)]
struct JsearchJob {
    job_id: String,
    job_title: String,
    employer_name: String,
    #[serde(default)]
    job_city: Option<String>,
    #[serde(default)]
    job_state: Option<String>,
    #[serde(default)]
    job_country: Option<String>,
    #[serde(default)]
    job_description: String,
    job_apply_link: String,
    #[serde(default)]
    job_is_remote: bool,
    #[serde(default)]
    job_employment_type: Option<String>,
    #[serde(default)]
    job_min_salary: Option<f64>,
    #[serde(default)]
    job_max_salary: Option<f64>,
    #[serde(default)]
    job_salary_period: Option<String>,
    #[serde(default)]
    job_posted_at_timestamp: Option<i64>,
    #[serde(default)]
    job_offer_expiration_timestamp: Option<i64>,
    #[serde(default)]
    job_required_experience: Option<RequiredExperience>,
}

#[derive(Debug, Deserialize)]
struct RequiredExperience {
    #[serde(default)]
    required_experience_in_months: Option<u32>,
}

fn job_type(raw: Option<&str>) -> JobType {
    let upper = raw.unwrap_or_default().to_uppercase();
    if upper.contains("PART") {
        JobType::PartTime
    } else if upper.contains("CONTRACT") || upper.contains("FREELANCE") {
        JobType::Contract
    } else if upper.contains("INTERN") {
        JobType::Internship
    } else if upper.contains("TEMP") {
        JobType::Temporary
    } else {
        JobType::FullTime
    }
}

fn experience_level(months: u32) -> ExperienceLevel {
    match months {
        0..=24 => ExperienceLevel::Entry,
        25..=60 => ExperienceLevel::Mid,
        61..=120 => ExperienceLevel::Senior,
        _ => ExperienceLevel::Executive,
    }
}

fn salary_period(raw: &str) -> Option<SalaryPeriod> {
    let upper = raw.to_uppercase();
    if upper.contains("HOUR") {
        Some(SalaryPeriod::Hourly)
    } else if upper.contains("YEAR") || upper.contains("ANNUAL") {
        Some(SalaryPeriod::Yearly)
    } else {
        None
    }
}

fn normalize_state(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if let Some(code) = state_code(trimmed) {
        return Some(code.to_string());
    }
    (trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()))
        .then(|| trimmed.to_uppercase())
}

fn salary(value: Option<f64>) -> Option<i64> {
    value.filter(|v| *v > 0.0).map(|v| v.round() as i64)
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

pub struct JsearchAdapter;

impl JsearchAdapter {
    fn to_job(raw: JsearchJob, ctx: &AdapterContext) -> RawJob {
        let mut job = listing_job(
            raw.job_id,
            raw.job_title.trim(),
            raw.employer_name.trim(),
            raw.job_apply_link,
            timestamp(raw.job_posted_at_timestamp).unwrap_or(ctx.fetched_at),
        );
        job.city = raw.job_city.as_deref().and_then(text_or_none);
        job.state = raw.job_state.as_deref().and_then(normalize_state);
        job.country = Some(
            raw.job_country
                .as_deref()
                .and_then(text_or_none)
                .unwrap_or_else(|| "US".to_string()),
        );
        job.work_mode = Some(if raw.job_is_remote {
            WorkMode::Remote
        } else {
            WorkMode::Onsite
        });
        job.job_type = Some(job_type(raw.job_employment_type.as_deref()));
        job.experience_level = raw
            .job_required_experience
            .and_then(|e| e.required_experience_in_months)
            .map(experience_level);
        job.salary_min = salary(raw.job_min_salary);
        job.salary_max = salary(raw.job_max_salary);
        job.salary_period = raw.job_salary_period.as_deref().and_then(salary_period);
        job.description = raw.job_description;
        job.expires_at = timestamp(raw.job_offer_expiration_timestamp);
        job
    }
}

impl SourceAdapter for JsearchAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Jsearch
    }

    fn listing_targets(&self, ctx: &AdapterContext) -> Result<Vec<ListingTarget>, AdapterError> {
        let key = ctx
            .jsearch_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AdapterError::MissingCredential("JSEARCH_API_KEY"))?;
        Ok(RAIL_QUERIES
            .iter()
            .map(|query| {
                let url = format!(
                    "https://{RAPIDAPI_HOST}/search?query={}&page=1&num_pages=1&date_posted=month&country=US",
                    query.replace(' ', "+")
                );
                ListingTarget::new(
                    *query,
                    PageRequest::get(url)
                        .header("x-rapidapi-key", key)
                        .header("x-rapidapi-host", RAPIDAPI_HOST),
                )
            })
            .collect())
    }

    fn parse_listing(
        &self,
        _target: &ListingTarget,
        page: &FetchedPage,
        ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError> {
        let response: SearchResponse = serde_json::from_str(&page.body)
            .map_err(|e| AdapterError::Malformed(format!("jsearch response: {e}")))?;
        Ok(RawBatch::Jobs(
            response
                .data
                .into_iter()
                .map(|raw| Self::to_job(raw, ctx))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ctx, fixture, page};

    fn keyed_ctx() -> AdapterContext {
        AdapterContext {
            jsearch_api_key: Some("test-key".into()),
            ..ctx()
        }
    }

    #[test]
    fn missing_key_is_a_credential_error() {
        let err = JsearchAdapter.listing_targets(&ctx()).unwrap_err();
        assert!(matches!(err, AdapterError::MissingCredential("JSEARCH_API_KEY")));
    }

    #[test]
    fn one_target_per_query_with_rapidapi_headers() {
        let targets = JsearchAdapter.listing_targets(&keyed_ctx()).unwrap();
        assert_eq!(targets.len(), RAIL_QUERIES.len());
        assert!(targets[0].request.url.contains("query=railroad+jobs"));
        assert!(targets[0]
            .request
            .headers
            .contains(&("x-rapidapi-key".to_string(), "test-key".to_string())));
    }

    #[test]
    fn maps_aggregator_fields() {
        let targets = JsearchAdapter.listing_targets(&keyed_ctx()).unwrap();
        let body = fixture("jsearch", "search.json");
        let RawBatch::Jobs(jobs) = JsearchAdapter
            .parse_listing(&targets[0], &page(body), &keyed_ctx())
            .unwrap()
        else {
            panic!("expected jobs");
        };
        assert_eq!(jobs.len(), 2);

        let engineer = &jobs[0];
        assert_eq!(engineer.external_id, "Xk3h9QwZ1AAAAAAAAAAAAA==");
        assert_eq!(engineer.company, "Genesee & Wyoming");
        assert_eq!(engineer.state.as_deref(), Some("OH"));
        assert_eq!(engineer.job_type, Some(JobType::FullTime));
        assert_eq!(engineer.experience_level, Some(ExperienceLevel::Mid));
        assert_eq!(engineer.salary_min, Some(62000));
        assert_eq!(engineer.salary_max, Some(84501));
        assert_eq!(engineer.salary_period, Some(SalaryPeriod::Yearly));
        assert_eq!(engineer.posted_at.timestamp(), 1_771_545_600);
        assert!(engineer.expires_at.is_some());

        let contractor = &jobs[1];
        assert_eq!(contractor.work_mode, Some(WorkMode::Remote));
        assert_eq!(contractor.job_type, Some(JobType::Contract));
        assert_eq!(contractor.state, None);
        assert_eq!(contractor.salary_min, None);
        assert_eq!(contractor.salary_period, Some(SalaryPeriod::Hourly));
        assert_eq!(contractor.experience_level, None);
    }

    #[test]
    fn experience_bands() {
        assert_eq!(experience_level(24), ExperienceLevel::Entry);
        assert_eq!(experience_level(60), ExperienceLevel::Mid);
        assert_eq!(experience_level(120), ExperienceLevel::Senior);
        assert_eq!(experience_level(121), ExperienceLevel::Executive);
    }
}
