//! CSX embargo and service bulletin pages.
//!
//! Parsed in layers: table rows first, then news links, then bare list
//! items. Each page carries its own default advisory type.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use railhub_core::classify::classify_advisory;
use railhub_core::identity::short_hash;
use railhub_core::{AdvisoryType, RawAdvisory, RawBatch, SourceId};
use railhub_storage::{FetchedPage, PageRequest};
use scraper::Html;
use tracing::debug;

use super::truncate_chars;
use crate::parse::{affected_area, element_text, find_any_date, midnight_utc, selector, text_or_none};
use crate::{AdapterContext, AdapterError, ListingTarget, SourceAdapter};

const EMBARGO_LABEL: &str = "embargoes";
const BULLETIN_LABEL: &str = "service-bulletins";
const MAX_TITLE_CHARS: usize = 300;

#[derive(Debug, Default)]
struct Entry {
    title: String,
    description: Option<String>,
    date: Option<NaiveDate>,
    area: Option<String>,
    expires: Option<NaiveDate>,
}

fn header_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)embargo\s+number|header").expect("valid header row regex"))
}

fn nav_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(home|about|contact|login|sign)").expect("valid nav regex"))
}

fn from_table_rows(document: &Html) -> Result<Vec<Entry>, AdapterError> {
    let tr_sel = selector("tr")?;
    let td_sel = selector("td")?;
    let mut out = Vec::new();
    for row in document.select(&tr_sel) {
        let cells: Vec<String> = row.select(&td_sel).map(element_text).collect();
        if cells.len() < 2 {
            continue;
        }
        let title = cells[0].clone();
        if title.chars().count() < 3 || header_row_re().is_match(&title) {
            continue;
        }
        let cell = |idx: usize| cells.get(idx).and_then(|c| text_or_none(c));
        out.push(Entry {
            date: find_any_date(&cells[1]),
            area: cell(2),
            description: cell(3),
            expires: cell(4).as_deref().and_then(find_any_date),
            title,
        });
    }
    Ok(out)
}

fn from_news_links(document: &Html) -> Result<Vec<Entry>, AdapterError> {
    let a_sel = selector("a[href]")?;
    let mut out = Vec::new();
    for link in document.select(&a_sel) {
        let href = link.value().attr("href").unwrap_or_default();
        if !(href.contains("customers/news")
            || href.contains("embargo")
            || href.contains("service-bulletin"))
        {
            continue;
        }
        let title = element_text(link);
        if title.chars().count() < 10 {
            continue;
        }
        out.push(Entry {
            date: find_any_date(&title),
            title: truncate_chars(&title, MAX_TITLE_CHARS),
            ..Entry::default()
        });
    }
    Ok(out)
}

fn from_list_items(document: &Html) -> Result<Vec<Entry>, AdapterError> {
    let li_sel = selector("li")?;
    let mut out = Vec::new();
    for item in document.select(&li_sel) {
        let text = element_text(item);
        if text.chars().count() < 15 || nav_item_re().is_match(&text) {
            continue;
        }
        out.push(Entry {
            date: find_any_date(&text),
            title: truncate_chars(&text, MAX_TITLE_CHARS),
            ..Entry::default()
        });
    }
    Ok(out)
}

pub struct CsxEmbargoesAdapter;

impl CsxEmbargoesAdapter {
    fn default_type(target: &ListingTarget) -> AdvisoryType {
        if target.label == EMBARGO_LABEL {
            AdvisoryType::Embargo
        } else {
            AdvisoryType::ServiceAlert
        }
    }
}

impl SourceAdapter for CsxEmbargoesAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::CsxEmbargoes
    }

    fn listing_targets(&self, _ctx: &AdapterContext) -> Result<Vec<ListingTarget>, AdapterError> {
        let base = SourceId::CsxEmbargoes.base_url();
        let page = |path: &str| {
            PageRequest::get(format!("{base}/index.cfm/customers/news/{path}/"))
                .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
                .header("Accept-Language", "en-US,en;q=0.5")
        };
        Ok(vec![
            ListingTarget::new(EMBARGO_LABEL, page("embargoes")),
            ListingTarget::new(BULLETIN_LABEL, page("service-bulletins1")),
        ])
    }

    fn parse_listing(
        &self,
        target: &ListingTarget,
        page: &FetchedPage,
        ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError> {
        let document = Html::parse_document(&page.body);
        let layers: [fn(&Html) -> Result<Vec<Entry>, AdapterError>; 3] =
            [from_table_rows, from_news_links, from_list_items];

        let mut entries = Vec::new();
        for (layer, parse) in layers.iter().enumerate() {
            entries = parse(&document)?;
            if !entries.is_empty() {
                debug!(target = %target.label, layer, entries = entries.len(), "csx entries");
                break;
            }
        }

        let fallback = Self::default_type(target);
        Ok(RawBatch::Advisories(
            entries
                .into_iter()
                .map(|entry| {
                    let date_text = entry.date.map(|d| d.to_string()).unwrap_or_default();
                    RawAdvisory {
                        external_id: format!("csx-{}", short_hash(&format!("{}{date_text}", entry.title))),
                        railroad: "CSX".to_string(),
                        advisory_type: classify_advisory(&entry.title, fallback),
                        description: entry.description.unwrap_or_else(|| entry.title.clone()),
                        affected_area: entry.area.or_else(|| affected_area(&entry.title)),
                        issued_at: entry.date.map(midnight_utc).unwrap_or(ctx.fetched_at),
                        expires_at: entry.expires.map(midnight_utc),
                        title: entry.title,
                    }
                })
                .collect(),
        ))
    }
}
