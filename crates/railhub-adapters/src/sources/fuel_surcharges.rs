//! Fuel surcharges for every Class I carrier, derived from the EIA weekly
//! U.S. on-highway diesel price through each railroad's published tiers.

use std::sync::OnceLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use railhub_core::{RawBatch, RawFuelSurcharge, SourceId};
use railhub_storage::{FetchedPage, PageRequest};
use tracing::info;

use crate::{AdapterContext, AdapterError, ListingTarget, SourceAdapter};

const MIN_PLAUSIBLE_PRICE: f64 = 1.5;
const MAX_PLAUSIBLE_PRICE: f64 = 8.0;

/// How a carrier turns the diesel price into a surcharge percentage.
#[derive(Debug, Clone, Copy)]
enum Formula {
    /// `(ceiling, rate)` pairs checked in order, inclusive; `above` past the last.
    Tiers {
        tiers: &'static [(f64, f64)],
        above: f64,
    },
    /// Zero below `floor`, else `base + per_step` for every whole 5 cents over it.
    Stepped { floor: f64, base: f64, per_step: f64 },
}

impl Formula {
    fn rate(&self, diesel: f64) -> f64 {
        match *self {
            Formula::Tiers { tiers, above } => tiers
                .iter()
                .find(|(ceiling, _)| diesel <= *ceiling)
                .map(|(_, rate)| *rate)
                .unwrap_or(above),
            Formula::Stepped {
                floor,
                base,
                per_step,
            } => {
                if diesel < floor {
                    0.0
                } else {
                    let steps = ((diesel - floor) / 0.05).floor();
                    base + steps * per_step
                }
            }
        }
    }
}

const SCHEDULES: &[(&str, &str, Formula)] = &[
    (
        "NS",
        "Carload",
        Formula::Tiers {
            tiers: &[(2.0, 0.0), (2.5, 4.0), (3.0, 8.0), (3.5, 13.0), (4.0, 18.0), (4.5, 24.0)],
            above: 30.0,
        },
    ),
    (
        "NS",
        "Intermodal",
        Formula::Tiers {
            tiers: &[(2.0, 0.0), (2.5, 15.0), (3.0, 25.0), (3.5, 35.0), (4.0, 40.0)],
            above: 45.0,
        },
    ),
    (
        "UP",
        "Carload",
        Formula::Stepped {
            floor: 1.35,
            base: 1.5,
            per_step: 0.5,
        },
    ),
    (
        "UP",
        "Intermodal",
        Formula::Stepped {
            floor: 1.35,
            base: 2.0,
            per_step: 0.6,
        },
    ),
    (
        "BNSF",
        "Carload",
        Formula::Tiers {
            tiers: &[(2.5, 0.0), (3.0, 6.0), (3.5, 12.0), (4.0, 18.0), (4.5, 24.0)],
            above: 30.0,
        },
    ),
    (
        "BNSF",
        "Intermodal",
        Formula::Tiers {
            tiers: &[(2.5, 0.0), (3.0, 10.0), (3.5, 20.0), (4.0, 30.0), (4.5, 38.0)],
            above: 44.0,
        },
    ),
    (
        "CSX",
        "Carload",
        Formula::Tiers {
            tiers: &[(2.0, 0.0), (2.5, 5.0), (3.0, 9.0), (3.5, 13.0), (4.0, 18.0), (4.5, 24.0)],
            above: 30.0,
        },
    ),
    (
        "CSX",
        "Intermodal",
        Formula::Tiers {
            tiers: &[(2.0, 0.0), (2.5, 12.0), (3.0, 22.0), (3.5, 32.0), (4.0, 38.0)],
            above: 44.0,
        },
    ),
];

fn cdata_description_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<description><!\[CDATA\[(.*?)\]\]>").expect("valid rss description regex")
    })
}

fn us_price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+\.\d+)\s+\.\.?\s+U\.S\.").expect("valid diesel price regex"))
}

/// The U.S. average diesel price from the EIA gasoline/diesel RSS feed.
pub fn us_diesel_price(rss: &str) -> Option<f64> {
    cdata_description_re()
        .captures_iter(rss)
        .map(|c| c.get(1).map_or("", |m| m.as_str()))
        .filter(|desc| desc.contains("Diesel") && desc.contains("U.S."))
        .flat_map(|desc| us_price_re().captures_iter(desc))
        .filter_map(|c| c[1].parse::<f64>().ok())
        .find(|price| *price > MIN_PLAUSIBLE_PRICE && *price < MAX_PLAUSIBLE_PRICE)
}

fn monday_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub struct FuelSurchargeAdapter;

impl SourceAdapter for FuelSurchargeAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::FuelSurcharges
    }

    fn listing_targets(&self, _ctx: &AdapterContext) -> Result<Vec<ListingTarget>, AdapterError> {
        Ok(vec![ListingTarget::new(
            "eia-diesel-rss",
            PageRequest::get(format!(
                "{}/petroleum/gasdiesel/includes/gas_diesel_rss.xml",
                SourceId::FuelSurcharges.base_url()
            )),
        )])
    }

    fn parse_listing(
        &self,
        _target: &ListingTarget,
        page: &FetchedPage,
        ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError> {
        let diesel = us_diesel_price(&page.body)
            .ok_or_else(|| AdapterError::Malformed("no U.S. diesel price in EIA feed".into()))?;
        let effective_date = monday_of_week(ctx.fetched_at.date_naive());
        info!(diesel, %effective_date, "current DOE diesel price");

        Ok(RawBatch::FuelSurcharges(
            SCHEDULES
                .iter()
                .map(|(railroad, traffic_type, formula)| RawFuelSurcharge {
                    railroad: railroad.to_string(),
                    effective_date,
                    fuel_price: Some(diesel),
                    surcharge_rate: formula.rate(diesel),
                    traffic_type: Some(traffic_type.to_string()),
                })
                .collect(),
        ))
    }
}
