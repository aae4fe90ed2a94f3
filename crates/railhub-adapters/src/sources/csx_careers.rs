//! CSX careers through the Oracle HCM candidate-experience REST API.

use railhub_core::{JobType, RawBatch, RawJob, SourceId, WorkMode};
use railhub_storage::{FetchedPage, PageRequest};
use serde::Deserialize;
use tracing::warn;

use super::listing_job;
use crate::parse::{midnight_utc, parse_us_date, text_or_none};
use crate::{AdapterContext, AdapterError, ListingTarget, SourceAdapter};

const HCM_HOST: &str = "https://fa-eowa-saasfaprod1.fa.ocs.oraclecloud.com";

const FINDER: &str = "findReqs;siteNumber=CX_45001,facetsList=LOCATIONS%3BWORK_LOCATIONS%3BWORKPLACE_TYPES%3BTITLES%3BCATEGORIES%3BORGANIZATIONS%3BPOSTING_DATES%3BFLEX_FIELDS,limit=100,lastSelectedFacet=POSTING_DATES,sortBy=POSTING_DATES_DESC";

#[derive(Debug, Deserialize)]
struct RequisitionResponse {
    #[serde(default)]
    items: Vec<RequisitionGroup>,
}

#[derive(Debug, Deserialize)]
struct RequisitionGroup {
    #[serde(rename = "requisitionList", default)]
    requisition_list: Vec<Requisition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Requisition {
    id: String,
    title: String,
    #[serde(default)]
    posted_date: Option<String>,
    #[serde(default)]
    primary_location: Option<String>,
    #[serde(default)]
    workplace_type_code: Option<String>,
    #[serde(default)]
    short_description_str: Option<String>,
    #[serde(default)]
    external_responsibilities_str: Option<String>,
    #[serde(default)]
    external_qualifications_str: Option<String>,
}

pub struct CsxCareersAdapter;

impl CsxCareersAdapter {
    fn endpoint() -> String {
        format!(
            "{HCM_HOST}/hcmRestApi/resources/latest/recruitingCEJobRequisitions?onlyData=true&expand=requisitionList.secondaryLocations,flexFieldsFacet.values&finder={FINDER}"
        )
    }

    fn to_job(req: Requisition, ctx: &AdapterContext) -> RawJob {
        let posted_at = req
            .posted_date
            .as_deref()
            .and_then(parse_us_date)
            .map(midnight_utc)
            .unwrap_or(ctx.fetched_at);
        let apply_url = format!(
            "{HCM_HOST}/hcmUI/CandidateExperience/en/sites/CSXCareers/job/{}",
            req.id
        );

        let mut job = listing_job(
            format!("csx-{}", req.id),
            req.title.trim(),
            "CSX Transportation",
            apply_url,
            posted_at,
        );
        let (city, state) = primary_location(req.primary_location.as_deref().unwrap_or_default());
        job.city = city;
        job.state = state;
        job.work_mode = Some(match req.workplace_type_code.as_deref() {
            Some("ORA_REMOTE") => WorkMode::Remote,
            Some("ORA_HYBRID") => WorkMode::Hybrid,
            _ => WorkMode::Onsite,
        });
        job.job_type = Some(JobType::FullTime);
        job.description = [
            req.short_description_str,
            req.external_responsibilities_str,
            req.external_qualifications_str,
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
        job
    }
}

/// "Jacksonville, FL 32202" to ("Jacksonville", "FL"); a location without a
/// comma is all city.
fn primary_location(location: &str) -> (Option<String>, Option<String>) {
    match location.split_once(',') {
        None => (text_or_none(location), None),
        Some((city, rest)) => {
            let code = rest.split_whitespace().next().unwrap_or_default();
            let state = (code.len() == 2 && code.chars().all(|c| c.is_ascii_uppercase()))
                .then(|| code.to_string());
            (text_or_none(city), state)
        }
    }
}

impl SourceAdapter for CsxCareersAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::CsxCareers
    }

    fn listing_targets(&self, _ctx: &AdapterContext) -> Result<Vec<ListingTarget>, AdapterError> {
        Ok(vec![ListingTarget::new(
            "requisitions",
            PageRequest::get(Self::endpoint()),
        )])
    }

    fn parse_listing(
        &self,
        _target: &ListingTarget,
        page: &FetchedPage,
        ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError> {
        let response: RequisitionResponse = serde_json::from_str(&page.body)
            .map_err(|e| AdapterError::Malformed(format!("csx requisitions: {e}")))?;

        let mut jobs = Vec::new();
        for req in response.items.into_iter().flat_map(|g| g.requisition_list) {
            if req.title.trim().is_empty() {
                warn!(id = %req.id, "csx requisition without a title");
                continue;
            }
            jobs.push(Self::to_job(req, ctx));
        }
        Ok(RawBatch::Jobs(jobs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ctx, fixture, page};
    use chrono::NaiveDate;

    #[test]
    fn maps_requisitions_to_jobs() {
        let adapter = CsxCareersAdapter;
        let targets = adapter.listing_targets(&ctx()).unwrap();
        assert!(targets[0].request.url.contains("siteNumber=CX_45001"));

        let body = fixture("csx-careers", "requisitions.json");
        let RawBatch::Jobs(jobs) = adapter.parse_listing(&targets[0], &page(body), &ctx()).unwrap()
        else {
            panic!("expected jobs");
        };
        assert_eq!(jobs.len(), 3);

        let conductor = &jobs[0];
        assert_eq!(conductor.external_id, "csx-25001234");
        assert_eq!(conductor.company, "CSX Transportation");
        assert_eq!(conductor.city.as_deref(), Some("Jacksonville"));
        assert_eq!(conductor.state.as_deref(), Some("FL"));
        assert_eq!(conductor.work_mode, Some(WorkMode::Onsite));
        assert_eq!(
            conductor.posted_at.date_naive(),
            NaiveDate::from_ymd_opt(2026, 2, 20).unwrap()
        );
        assert!(conductor.description.contains("\n\n"));
        assert!(conductor.apply_url.ends_with("/CSXCareers/job/25001234"));

        assert_eq!(jobs[1].work_mode, Some(WorkMode::Hybrid));
        assert_eq!(jobs[2].city.as_deref(), Some("Remote"));
        assert_eq!(jobs[2].state, None);
        assert_eq!(jobs[2].posted_at, ctx().fetched_at);
    }

    #[test]
    fn non_json_body_is_malformed() {
        let adapter = CsxCareersAdapter;
        let targets = adapter.listing_targets(&ctx()).unwrap();
        let err = adapter
            .parse_listing(&targets[0], &page("<html>maintenance</html>"), &ctx())
            .unwrap_err();
        assert!(matches!(err, AdapterError::Malformed(_)));
    }
}
