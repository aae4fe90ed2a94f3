//! BNSF customer notifications page.
//!
//! Primary layout: one `h3`/`h4` heading per notification followed by its
//! date and a paragraph. Fallback: a plain list of links.

use railhub_core::classify::classify_advisory;
use railhub_core::identity::short_hash;
use railhub_core::{AdvisoryType, RawAdvisory, RawBatch, SourceId};
use railhub_storage::{FetchedPage, PageRequest};
use scraper::{ElementRef, Html};
use tracing::debug;

use crate::parse::{
    affected_area, element_text, find_written_date, midnight_utc, selector, text_or_none,
};
use crate::{AdapterContext, AdapterError, ListingTarget, SourceAdapter};

const MIN_TITLE_LEN: usize = 5;

struct Notification {
    title: String,
    description: Option<String>,
    date: Option<chrono::NaiveDate>,
}

fn is_heading(el: &ElementRef<'_>) -> bool {
    matches!(el.value().name(), "h3" | "h4")
}

fn from_headings(document: &Html) -> Result<Vec<Notification>, AdapterError> {
    let heading_sel = selector("h3, h4")?;
    let p_sel = selector("p")?;
    let mut out = Vec::new();

    for heading in document.select(&heading_sel) {
        let title = element_text(heading);
        if title.chars().count() < MIN_TITLE_LEN {
            continue;
        }
        let following: Vec<ElementRef<'_>> = heading
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .take_while(|el| !is_heading(el))
            .collect();

        let mut context = title.clone();
        for el in &following {
            context.push(' ');
            context.push_str(&element_text(*el));
        }
        let description = following
            .iter()
            .find_map(|el| {
                if el.value().name() == "p" {
                    Some(*el)
                } else {
                    el.select(&p_sel).next()
                }
            })
            .and_then(|p| text_or_none(element_text(p)));

        out.push(Notification {
            date: find_written_date(&context),
            title,
            description,
        });
    }
    Ok(out)
}

fn from_link_list(document: &Html) -> Result<Vec<Notification>, AdapterError> {
    let li_sel = selector("li")?;
    let a_sel = selector("a")?;
    let mut out = Vec::new();
    for li in document.select(&li_sel) {
        let Some(link) = li.select(&a_sel).next() else {
            continue;
        };
        let title = element_text(link);
        if title.chars().count() < MIN_TITLE_LEN {
            continue;
        }
        out.push(Notification {
            date: find_written_date(&element_text(li)),
            title,
            description: None,
        });
    }
    Ok(out)
}

pub struct BnsfAdvisoriesAdapter;

impl SourceAdapter for BnsfAdvisoriesAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::BnsfAdvisories
    }

    fn listing_targets(&self, _ctx: &AdapterContext) -> Result<Vec<ListingTarget>, AdapterError> {
        Ok(vec![ListingTarget::new(
            "customer-notifications",
            PageRequest::get(format!(
                "{}/news-media/customer-notifications.html",
                SourceId::BnsfAdvisories.base_url()
            ))
            .header("Accept", "text/html"),
        )])
    }

    fn parse_listing(
        &self,
        _target: &ListingTarget,
        page: &FetchedPage,
        ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError> {
        let document = Html::parse_document(&page.body);
        let mut notifications = from_headings(&document)?;
        if notifications.is_empty() {
            debug!("no notification headings, trying link list");
            notifications = from_link_list(&document)?;
        }

        Ok(RawBatch::Advisories(
            notifications
                .into_iter()
                .map(|n| {
                    let date_text = n.date.map(|d| d.to_string()).unwrap_or_default();
                    RawAdvisory {
                        external_id: format!("bnsf-{}", short_hash(&format!("{}{date_text}", n.title))),
                        railroad: "BNSF".to_string(),
                        advisory_type: classify_advisory(&n.title, AdvisoryType::ServiceAlert),
                        description: n.description.unwrap_or_else(|| n.title.clone()),
                        affected_area: affected_area(&n.title),
                        issued_at: n.date.map(midnight_utc).unwrap_or(ctx.fetched_at),
                        expires_at: None,
                        title: n.title,
                    }
                })
                .collect(),
        ))
    }
}
