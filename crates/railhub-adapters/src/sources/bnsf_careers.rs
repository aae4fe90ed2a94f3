//! BNSF careers. The search page embeds its results as a JSON object under
//! `"eagerLoadRefineSearch":`; the first page reports how many pages follow.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, Utc};
use railhub_core::{JobType, RawBatch, RawJob, SourceId, WorkMode};
use railhub_storage::{FetchedPage, PageFetcher, PageRequest};
use serde::Deserialize;
use tracing::{info, warn};

use super::listing_job;
use crate::parse::{midnight_utc, parse_us_date, state_code, text_or_none};
use crate::{fetch_listings, AdapterContext, AdapterError, ListingTarget, SourceAdapter};

const PAYLOAD_MARKER: &str = "\"eagerLoadRefineSearch\":";
const PAGE_SIZE: u32 = 10;
const MAX_PAGES: u32 = 15;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPayload {
    #[serde(default)]
    total_hits: u32,
    #[serde(default)]
    data: Option<SearchData>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    jobs: Vec<BnsfJob>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BnsfJob {
    #[serde(default)]
    title: String,
    #[serde(default)]
    job_seq_no: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    posted_date: Option<String>,
    #[serde(default)]
    description_teaser: Option<String>,
    #[serde(default)]
    apply_url: Option<String>,
}

/// Slice of `html` holding the JSON object that follows `marker`, found by
/// brace counting that skips over string literals.
fn embedded_object<'a>(html: &'a str, marker: &str) -> Option<&'a str> {
    let start = html.find(marker)? + marker.len();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, byte) in html.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&html[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn search_payload(body: &str) -> Result<SearchPayload, AdapterError> {
    let json = embedded_object(body, PAYLOAD_MARKER)
        .ok_or_else(|| AdapterError::Malformed("no eagerLoadRefineSearch payload".into()))?;
    serde_json::from_str(json).map_err(|e| AdapterError::Malformed(format!("bnsf payload: {e}")))
}

/// ISO timestamps or "Posted 3 days ago" style relative dates.
fn posted_at(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return now;
    };
    if let Some(date) = parse_us_date(raw) {
        return midnight_utc(date);
    }
    let lower = raw.to_lowercase();
    let count = |unit: &str| -> Option<i64> {
        let idx = lower.find(unit)?;
        lower[..idx].split_whitespace().last()?.parse().ok()
    };
    if let Some(days) = count(" day") {
        now - Duration::days(days)
    } else if let Some(weeks) = count(" week") {
        now - Duration::weeks(weeks)
    } else if let Some(months) = count(" month") {
        u32::try_from(months)
            .ok()
            .and_then(|m| now.checked_sub_months(Months::new(m)))
            .unwrap_or(now)
    } else {
        now
    }
}

fn search_target(from: u32) -> ListingTarget {
    ListingTarget::new(
        format!("from={from}"),
        PageRequest::get(format!(
            "{}/us/en/search-results?keywords=&from={from}&s=1",
            SourceId::BnsfCareers.base_url()
        ))
        .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
        .header("Accept-Language", "en-US,en;q=0.9"),
    )
}

pub struct BnsfCareersAdapter;

impl BnsfCareersAdapter {
    fn to_jobs(payload: SearchPayload, ctx: &AdapterContext) -> Vec<RawJob> {
        payload
            .data
            .unwrap_or_default()
            .jobs
            .into_iter()
            .filter_map(|raw| {
                let seq = raw.job_seq_no.as_deref().and_then(text_or_none)?;
                let title = text_or_none(&raw.title)?;
                let apply_url = raw
                    .apply_url
                    .as_deref()
                    .and_then(text_or_none)
                    .unwrap_or_else(|| format!("{}/us/en/job/{seq}", SourceId::BnsfCareers.base_url()));
                let mut job = listing_job(
                    format!("bnsf-{seq}"),
                    title.as_str(),
                    "BNSF Railway",
                    apply_url,
                    posted_at(raw.posted_date.as_deref(), ctx.fetched_at),
                );
                job.city = raw.city.as_deref().and_then(text_or_none);
                job.state = raw.state.as_deref().and_then(|s| {
                    state_code(s)
                        .map(str::to_string)
                        .or_else(|| text_or_none(s))
                });
                job.work_mode = Some(WorkMode::Onsite);
                job.job_type = Some(JobType::FullTime);
                job.description = raw
                    .description_teaser
                    .as_deref()
                    .and_then(text_or_none)
                    .unwrap_or_else(|| match &job.city {
                        Some(city) => format!("{title} at BNSF Railway in {city}. Apply at jobs.bnsf.com"),
                        None => format!("{title} at BNSF Railway. Apply at jobs.bnsf.com"),
                    });
                Some(job)
            })
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for BnsfCareersAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::BnsfCareers
    }

    fn listing_targets(&self, _ctx: &AdapterContext) -> Result<Vec<ListingTarget>, AdapterError> {
        Ok(vec![search_target(0)])
    }

    fn parse_listing(
        &self,
        _target: &ListingTarget,
        page: &FetchedPage,
        ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError> {
        Ok(RawBatch::Jobs(Self::to_jobs(search_payload(&page.body)?, ctx)))
    }

    /// The first page decides how many more to fetch; later pages are
    /// best-effort.
    async fn fetch(
        &self,
        http: &dyn PageFetcher,
        ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError> {
        let first = search_target(0);
        let page = match http.fetch_page(self.source_id(), &first.request).await {
            Ok(page) => page,
            Err(err) if err.is_transport() => {
                return Err(AdapterError::Unreachable {
                    source_id: self.source_id(),
                    last: err.to_string(),
                })
            }
            Err(err) if err.is_oversized() => {
                return Err(AdapterError::Oversized {
                    target: first.label.clone(),
                    source: err,
                })
            }
            Err(err) => {
                warn!(source = self.source_id().slug(), error = %err, "first results page failed");
                return Ok(RawBatch::Jobs(Vec::new()));
            }
        };
        let payload = match search_payload(&page.body) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(source = self.source_id().slug(), error = %err, "first results page unparseable");
                return Ok(RawBatch::Jobs(Vec::new()));
            }
        };

        let total_hits = payload.total_hits;
        let mut batch = RawBatch::Jobs(Self::to_jobs(payload, ctx));
        let rest: Vec<ListingTarget> = (1..MAX_PAGES)
            .map(|page| page * PAGE_SIZE)
            .take_while(|from| *from < total_hits)
            .map(search_target)
            .collect();
        info!(source = self.source_id().slug(), total_hits, extra_pages = rest.len(), "bnsf search results");

        if !rest.is_empty() {
            if !ctx.page_delay.is_zero() {
                tokio::time::sleep(ctx.page_delay).await;
            }
            match fetch_listings(self, http, ctx, &rest).await {
                Ok(more) => {
                    let _ = batch.append(more);
                }
                Err(err @ AdapterError::Oversized { .. }) => return Err(err),
                Err(err) => {
                    warn!(source = self.source_id().slug(), error = %err, "later results pages unavailable");
                }
            }
        }
        batch.dedup();
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ctx, fixture, page, CannedFetcher};

    #[test]
    fn payload_extraction_skips_braces_inside_strings() {
        let html = r#"<script>phApp.ddo = {"eagerLoadRefineSearch":{"a":"}{\"}","b":{"c":1}},"x":2};</script>"#;
        assert_eq!(
            embedded_object(html, PAYLOAD_MARKER),
            Some(r#"{"a":"}{\"}","b":{"c":1}}"#)
        );
        assert_eq!(embedded_object("<html></html>", PAYLOAD_MARKER), None);
    }

    #[test]
    fn relative_dates_count_back_from_fetch_time() {
        let now = ctx().fetched_at;
        assert_eq!(posted_at(Some("Posted 3 days ago"), now), now - Duration::days(3));
        assert_eq!(posted_at(Some("2 weeks ago"), now), now - Duration::weeks(2));
        assert_eq!(posted_at(Some("today"), now), now);
        assert_eq!(posted_at(None, now), now);
        assert_eq!(
            posted_at(Some("2026-02-20T17:05:18.000+0000"), now)
                .date_naive()
                .to_string(),
            "2026-02-20"
        );
    }

    #[test]
    fn first_page_maps_jobs() {
        let adapter = BnsfCareersAdapter;
        let body = fixture("bnsf-careers", "search-results.html");
        let RawBatch::Jobs(jobs) = adapter
            .parse_listing(&search_target(0), &page(body), &ctx())
            .unwrap()
        else {
            panic!("expected jobs");
        };
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].external_id, "bnsf-BNSFUS12345EXTERNAL");
        assert_eq!(jobs[0].state.as_deref(), Some("TX"));
        assert!(jobs[0].description.contains("{signal}"));
        assert_eq!(jobs[1].state.as_deref(), Some("NE"));
        assert_eq!(
            jobs[1].description,
            "Carman at BNSF Railway in Lincoln. Apply at jobs.bnsf.com"
        );
        assert_eq!(
            jobs[1].apply_url,
            "https://jobs.bnsf.com/us/en/job/BNSFUS12377EXTERNAL"
        );
    }

    #[tokio::test]
    async fn fetch_follows_total_hits_and_drops_repeats() {
        let mut fetcher = CannedFetcher::default();
        fetcher.responses.insert(
            search_target(0).request.url,
            Ok(fixture("bnsf-careers", "search-results.html")),
        );
        fetcher.responses.insert(
            search_target(10).request.url,
            Ok(fixture("bnsf-careers", "search-results-10.html")),
        );

        let batch = BnsfCareersAdapter.fetch(&fetcher, &ctx()).await.unwrap();
        let RawBatch::Jobs(jobs) = batch else {
            panic!("expected jobs");
        };
        let ids: Vec<_> = jobs.iter().map(|j| j.external_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "bnsf-BNSFUS12345EXTERNAL",
                "bnsf-BNSFUS12377EXTERNAL",
                "bnsf-BNSFUS12400EXTERNAL"
            ]
        );
    }

    #[tokio::test]
    async fn unreachable_first_page_fails_the_source() {
        let err = BnsfCareersAdapter
            .fetch(&CannedFetcher::default(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn oversized_later_page_fails_the_source() {
        let mut fetcher = CannedFetcher::default();
        fetcher.responses.insert(
            search_target(0).request.url,
            Ok(fixture("bnsf-careers", "search-results.html")),
        );
        fetcher.oversized.push(search_target(10).request.url);

        let err = BnsfCareersAdapter.fetch(&fetcher, &ctx()).await.unwrap_err();
        assert!(matches!(err, AdapterError::Oversized { .. }));
    }
}
