//! SuccessFactors career sites (Amtrak, Union Pacific). Both render a table of
//! `tr.data-row` rows but differ in markup details and id conventions.

use std::sync::OnceLock;

use regex::Regex;
use railhub_core::{JobType, RawBatch, RawJob, SourceId, WorkMode};
use railhub_storage::{FetchedPage, PageRequest};
use scraper::{ElementRef, Html};
use tracing::debug;

use super::listing_job;
use crate::parse::{
    element_text, midnight_utc, parse_us_date, selector, select_first_text, split_city_state,
    text_or_none, title_case, trailing_numeric_id,
};
use crate::{AdapterContext, AdapterError, ListingTarget, SourceAdapter};

const SEARCH_PATH: &str = "/search/?q=&sortColumn=referencedate&sortDirection=desc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Site {
    Amtrak,
    UnionPacific,
}

pub struct SuccessFactorsAdapter {
    site: Site,
}

impl SuccessFactorsAdapter {
    pub fn amtrak() -> Self {
        Self { site: Site::Amtrak }
    }

    pub fn union_pacific() -> Self {
        Self {
            site: Site::UnionPacific,
        }
    }

    fn parse_row(&self, row: ElementRef<'_>, ctx: &AdapterContext) -> Result<Option<RawJob>, AdapterError> {
        match self.site {
            Site::Amtrak => amtrak_row(row, ctx),
            Site::UnionPacific => union_pacific_row(row, ctx),
        }
    }
}

fn job_number_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*-\s*\d{6,}\s*$").expect("valid job number regex"))
}

fn internship_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bintern(ship)?\b").expect("valid internship regex"))
}

fn remote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bremote\b").expect("valid remote regex"))
}

fn posted_at(raw: Option<&str>, ctx: &AdapterContext) -> chrono::DateTime<chrono::Utc> {
    raw.and_then(parse_us_date)
        .map(midnight_utc)
        .unwrap_or(ctx.fetched_at)
}

fn amtrak_row(row: ElementRef<'_>, ctx: &AdapterContext) -> Result<Option<RawJob>, AdapterError> {
    let link_sel = selector("span.jobTitle.hidden-phone a[href]")?;
    let Some(link) = row.select(&link_sel).next() else {
        return Ok(None);
    };
    let path = link.value().attr("href").unwrap_or_default().trim().to_string();
    let title = job_number_suffix_re()
        .replace(&element_text(link), "")
        .trim()
        .to_string();
    let Some(id) = trailing_numeric_id(&path) else {
        return Ok(None);
    };
    if title.is_empty() {
        return Ok(None);
    }

    let location = select_first_text(row, "td.colLocation span.jobLocation")?;
    let date = select_first_text(row, "td.colDate span.jobDate")?;

    let mut job = listing_job(
        id,
        title.as_str(),
        "Amtrak",
        format!("{}{path}", SourceId::AmtrakCareers.base_url()),
        posted_at(date.as_deref(), ctx),
    );
    let (city, state) = split_city_state(location.as_deref().unwrap_or_default());
    job.city = city;
    job.state = state;
    job.work_mode = Some(WorkMode::Onsite);
    job.job_type = Some(JobType::FullTime);
    job.description = format!(
        "{title} at Amtrak in {}. Apply at careers.amtrak.com",
        location.as_deref().unwrap_or("Amtrak")
    );
    Ok(Some(job))
}

fn union_pacific_row(row: ElementRef<'_>, ctx: &AdapterContext) -> Result<Option<RawJob>, AdapterError> {
    let link_sel = selector("a[href]")?;
    let Some(link) = row.select(&link_sel).next() else {
        return Ok(None);
    };
    let path = link.value().attr("href").unwrap_or_default().trim().to_string();
    let title = element_text(link);
    let Some(id) = trailing_numeric_id(&path) else {
        return Ok(None);
    };
    if title.is_empty() {
        return Ok(None);
    }

    let location = select_first_text(row, "td.colLocation")?.unwrap_or_default();
    let (city, state) = match split_city_state(&location) {
        (Some(city), state) => (Some(title_case(&city)), state),
        (None, _) => (text_or_none(title_case(&location)), None),
    };
    let date = select_first_text(row, "td.colDate")?;

    let job_type = if internship_re().is_match(&title) {
        JobType::Internship
    } else {
        JobType::FullTime
    };
    let place = [city.as_deref(), state.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");
    let place = if place.is_empty() {
        "various locations".to_string()
    } else {
        place
    };
    let role = match job_type {
        JobType::Internship => "internship",
        _ => "full-time position",
    };

    let mut job = listing_job(
        format!("up-{id}"),
        title.as_str(),
        "Union Pacific",
        format!("{}{path}", SourceId::UnionPacificCareers.base_url()),
        posted_at(date.as_deref(), ctx),
    );
    job.city = city;
    job.state = state;
    job.work_mode = Some(if remote_re().is_match(&title) {
        WorkMode::Remote
    } else {
        WorkMode::Onsite
    });
    job.job_type = Some(job_type);
    job.description = format!(
        "{title}: {role} at Union Pacific Railroad, based in {place}. Union Pacific operates one of the largest rail networks in North America, spanning 23 states across the western two-thirds of the United States."
    );
    Ok(Some(job))
}

impl SourceAdapter for SuccessFactorsAdapter {
    fn source_id(&self) -> SourceId {
        match self.site {
            Site::Amtrak => SourceId::AmtrakCareers,
            Site::UnionPacific => SourceId::UnionPacificCareers,
        }
    }

    fn listing_targets(&self, _ctx: &AdapterContext) -> Result<Vec<ListingTarget>, AdapterError> {
        let targets = match self.site {
            Site::Amtrak => vec![ListingTarget::new(
                "all-jobs",
                PageRequest::get(format!(
                    "{}/go/All-Jobs/8336500/?q=&sortColumn=referencedate&sortDirection=desc",
                    SourceId::AmtrakCareers.base_url()
                ))
                .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
                .header("Accept-Language", "en-US,en;q=0.9"),
            )],
            Site::UnionPacific => [0u32, 25, 50]
                .into_iter()
                .map(|offset| {
                    let base = SourceId::UnionPacificCareers.base_url();
                    let url = if offset == 0 {
                        format!("{base}{SEARCH_PATH}")
                    } else {
                        format!("{base}{SEARCH_PATH}&startrow={offset}")
                    };
                    ListingTarget::new(format!("startrow={offset}"), PageRequest::get(url))
                })
                .collect(),
        };
        Ok(targets)
    }

    fn parse_listing(
        &self,
        target: &ListingTarget,
        page: &FetchedPage,
        ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError> {
        let document = Html::parse_document(&page.body);
        let row_sel = selector("tr.data-row")?;

        let mut jobs = Vec::new();
        for row in document.select(&row_sel) {
            if let Some(job) = self.parse_row(row, ctx)? {
                jobs.push(job);
            }
        }
        debug!(source = self.source_id().slug(), target = %target.label, rows = jobs.len(), "parsed job rows");
        Ok(RawBatch::Jobs(jobs))
    }
}
