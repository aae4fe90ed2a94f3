//! Norfolk Southern careers: `li.job-tile` cards across two result pages.

use std::sync::OnceLock;

use regex::Regex;
use railhub_core::{JobType, RawBatch, RawJob, SourceId, WorkMode};
use railhub_storage::{FetchedPage, PageRequest};
use scraper::{ElementRef, Html};

use super::listing_job;
use crate::parse::{midnight_utc, parse_us_date, select_first_text, selector, split_city_state};
use crate::{AdapterContext, AdapterError, ListingTarget, SourceAdapter};

const SEARCH_PATH: &str = "/search/?q=&sortColumn=referencedate&sortDirection=desc";

fn remote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bremote\b").expect("valid remote regex"))
}

fn intern_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bintern").expect("valid intern regex"))
}

pub struct NorfolkSouthernAdapter;

impl NorfolkSouthernAdapter {
    fn tile_to_job(tile: ElementRef<'_>, ctx: &AdapterContext) -> Result<Option<RawJob>, AdapterError> {
        let Some(id) = tile
            .value()
            .classes()
            .find_map(|class| class.strip_prefix("job-id-"))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
        else {
            return Ok(None);
        };
        let Some(title) = select_first_text(tile, "a.jobTitle-link")? else {
            return Ok(None);
        };
        let path = tile.value().attr("data-url").unwrap_or_default();
        let location = select_first_text(tile, r#"[id$="desktop-section-location-value"]"#)?;
        let posted_at = select_first_text(tile, r#"[id$="desktop-section-date-value"]"#)?
            .as_deref()
            .and_then(parse_us_date)
            .map(midnight_utc)
            .unwrap_or(ctx.fetched_at);

        let mut job = listing_job(
            id,
            title.as_str(),
            "Norfolk Southern",
            format!("{}{path}", SourceId::NorfolkSouthernCareers.base_url()),
            posted_at,
        );
        let (city, state) = split_city_state(location.as_deref().unwrap_or_default());
        job.city = city;
        job.state = state;
        job.work_mode = Some(if remote_re().is_match(&title) {
            WorkMode::Remote
        } else {
            WorkMode::Onsite
        });
        job.job_type = Some(if intern_re().is_match(&title) {
            JobType::Internship
        } else {
            JobType::FullTime
        });
        job.description = format!(
            "{title} position at Norfolk Southern. Location: {}.",
            location.as_deref().unwrap_or("Various locations")
        );
        Ok(Some(job))
    }
}

impl SourceAdapter for NorfolkSouthernAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::NorfolkSouthernCareers
    }

    fn listing_targets(&self, _ctx: &AdapterContext) -> Result<Vec<ListingTarget>, AdapterError> {
        let base = SourceId::NorfolkSouthernCareers.base_url();
        Ok(vec![
            ListingTarget::new(
                "page-1",
                PageRequest::get(format!("{base}{SEARCH_PATH}"))
                    .header("Accept", "text/html,application/xhtml+xml"),
            ),
            ListingTarget::new(
                "page-2",
                PageRequest::get(format!("{base}{SEARCH_PATH}&startrow=25"))
                    .header("Accept", "text/html,application/xhtml+xml"),
            ),
        ])
    }

    fn parse_listing(
        &self,
        _target: &ListingTarget,
        page: &FetchedPage,
        ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError> {
        let document = Html::parse_document(&page.body);
        let tile_sel = selector("li.job-tile")?;
        let mut jobs = Vec::new();
        for tile in document.select(&tile_sel) {
            if let Some(job) = Self::tile_to_job(tile, ctx)? {
                jobs.push(job);
            }
        }
        Ok(RawBatch::Jobs(jobs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ctx, fixture, page};

    #[test]
    fn parses_job_tiles() {
        let adapter = NorfolkSouthernAdapter;
        let targets = adapter.listing_targets(&ctx()).unwrap();
        let body = fixture("norfolk-southern-careers", "search.html");
        let RawBatch::Jobs(jobs) = adapter.parse_listing(&targets[0], &page(body), &ctx()).unwrap()
        else {
            panic!("expected jobs");
        };
        assert_eq!(jobs.len(), 2);

        let carman = &jobs[0];
        assert_eq!(carman.external_id, "1401552");
        assert_eq!(carman.title, "Carman - Conway Yard");
        assert_eq!(carman.city.as_deref(), Some("Conway"));
        assert_eq!(carman.state.as_deref(), Some("PA"));
        assert_eq!(
            carman.apply_url,
            "https://jobs.nscorp.com/job/Conway-Carman-PA-15027/1401552/"
        );
        assert_eq!(
            carman.description,
            "Carman - Conway Yard position at Norfolk Southern. Location: Conway, PA, US, 15027."
        );

        let intern = &jobs[1];
        assert_eq!(intern.job_type, Some(JobType::Internship));
        assert_eq!(intern.work_mode, Some(WorkMode::Remote));
        assert_eq!(intern.city, None);
        assert!(intern.description.ends_with("Location: Various locations."));
    }
}
