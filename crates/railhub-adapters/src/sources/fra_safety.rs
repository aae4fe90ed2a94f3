//! FRA accident reports (Socrata JSON) and STB latest-news articles.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use railhub_core::classify::{classify_fra_incident, classify_stb_title};
use railhub_core::identity::short_hash;
use railhub_core::{RawBatch, RawRegulatoryUpdate, RegulatoryAgency, SourceId};
use railhub_storage::{FetchedPage, PageRequest};
use scraper::Html;
use serde_json::Value as JsonValue;
use url::Url;

use super::truncate_chars;
use crate::parse::{
    element_text, find_written_date, json_f64, json_str, midnight_utc, parse_us_date,
    select_first_attr, select_first_text, selector, text_or_none,
};
use crate::{AdapterContext, AdapterError, ListingTarget, SourceAdapter};

const FRA_LABEL: &str = "fra-accidents";
const STB_LABEL: &str = "stb-news";
const STB_NEWS_URL: &str = "https://www.stb.gov/news-communications/latest-news/";

fn docket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:Docket|Ex Parte)\s*(?:No\.\s*)?([A-Z0-9-]+)").expect("valid docket regex")
    })
}

fn first_of<'a>(row: &'a JsonValue, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .filter_map(|f| json_str(row, &[*f]))
        .find(|v| !v.trim().is_empty())
}

/// "$1,234,567" for whole-dollar damage estimates.
fn dollars(amount: f64) -> String {
    let digits = (amount.round() as i64).to_string();
    let mut grouped = String::new();
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${grouped}")
}

fn fra_row(row: &JsonValue) -> Option<RawRegulatoryUpdate> {
    let date = parse_us_date(json_str(row, &["date"])?)?;
    let published_at: DateTime<Utc> = midnight_utc(date);
    let railroad = first_of(row, &["railroad_name", "railroad_code"]).unwrap_or("Unknown");
    let incident_type = first_of(row, &["type"]).unwrap_or("Incident");
    let city = first_of(row, &["city_name", "station_name"]);
    let state = first_of(row, &["state_name"]);
    let location = [city, state].into_iter().flatten().collect::<Vec<_>>().join(", ");

    let killed = json_f64(row, &["total_killed"]).unwrap_or(0.0).max(0.0) as u32;
    let injured = json_f64(row, &["total_injured"]).unwrap_or(0.0).max(0.0) as u32;
    let damage = json_f64(row, &["total_damage"]).map(dollars);

    let id = first_of(row, &["incident_number", "report_number"])
        .map(str::to_string)
        .unwrap_or_else(|| {
            short_hash(&format!("{railroad}-{}-{incident_type}", published_at.to_rfc3339()))
        });

    let title = if location.is_empty() {
        format!("{incident_type} - {railroad}")
    } else {
        format!("{incident_type} - {railroad} ({location})")
    };

    let mut summary = vec![format!("{incident_type} involving {railroad}")];
    if !location.is_empty() {
        summary.push(format!("near {location}"));
    }
    summary.push(format!("on {}", date.format("%B %-d, %Y")));
    if killed > 0 {
        summary.push(format!("{killed} fatalities"));
    }
    if injured > 0 {
        summary.push(format!("{injured} injuries"));
    }
    if let Some(damage) = damage {
        summary.push(format!("estimated damage: {damage}"));
    }

    Some(RawRegulatoryUpdate {
        external_id: format!("fra-{id}"),
        agency: RegulatoryAgency::Fra,
        update_type: classify_fra_incident(incident_type, killed, injured),
        title: truncate_chars(&title, 300),
        summary: truncate_chars(&summary.join(". "), 500),
        content: first_of(row, &["narrative", "narrative1"]).map(|n| truncate_chars(n, 2000)),
        document_url: None,
        docket_number: None,
        published_at,
    })
}

/// Absolute http(s) form of `href` relative to the STB news page.
fn resolve_link(href: &str) -> Option<String> {
    let base = Url::parse(STB_NEWS_URL).ok()?;
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

fn stb_articles(body: &str, ctx: &AdapterContext) -> Result<Vec<RawRegulatoryUpdate>, AdapterError> {
    let document = Html::parse_document(body);
    let article_sel = selector("article")?;
    let mut out = Vec::new();
    for article in document.select(&article_sel) {
        let Some(title) = select_first_text(article, "h2, h3")? else {
            continue;
        };
        if title.chars().count() < 5 {
            continue;
        }
        let summary = select_first_text(article, "p")?
            .map(|p| truncate_chars(&p, 500))
            .unwrap_or_else(|| title.clone());
        let document_url = select_first_attr(article, "[href]", "href")?
            .as_deref()
            .and_then(resolve_link);
        let docket_number = docket_re()
            .captures(&title)
            .and_then(|c| text_or_none(&c[1]));
        let published_at = find_written_date(&element_text(article))
            .map(midnight_utc)
            .unwrap_or(ctx.fetched_at);

        out.push(RawRegulatoryUpdate {
            external_id: format!("stb-{}", short_hash(&title)),
            agency: RegulatoryAgency::Stb,
            update_type: classify_stb_title(&title),
            summary,
            content: None,
            document_url,
            docket_number,
            published_at,
            title,
        });
    }
    Ok(out)
}

pub struct FraSafetyAdapter;

impl SourceAdapter for FraSafetyAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::FraSafety
    }

    fn listing_targets(&self, _ctx: &AdapterContext) -> Result<Vec<ListingTarget>, AdapterError> {
        Ok(vec![
            ListingTarget::new(
                FRA_LABEL,
                PageRequest::get(format!(
                    "{}/resource/85tf-25kj.json?$limit=50&$order=date%20DESC&$where=date%3E%272024-01-01%27",
                    SourceId::FraSafety.base_url()
                ))
                .header("Accept", "application/json"),
            ),
            ListingTarget::new(
                STB_LABEL,
                PageRequest::get(STB_NEWS_URL).header("Accept", "text/html"),
            ),
        ])
    }

    fn parse_listing(
        &self,
        target: &ListingTarget,
        page: &FetchedPage,
        ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError> {
        let updates = if target.label == FRA_LABEL {
            let rows: Vec<JsonValue> = serde_json::from_str(&page.body)
                .map_err(|e| AdapterError::Malformed(format!("fra accidents: {e}")))?;
            rows.iter().filter_map(fra_row).collect()
        } else {
            stb_articles(&page.body, ctx)?
        };
        Ok(RawBatch::Regulatory(updates))
    }
}
