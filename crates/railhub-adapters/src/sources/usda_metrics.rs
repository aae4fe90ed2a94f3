//! USDA AgTransport rail service metrics (Socrata datasets).

use railhub_core::{MetricType, RawBatch, RawMetric, SourceId};
use railhub_storage::{FetchedPage, PageRequest};
use serde_json::Value as JsonValue;

use crate::parse::{json_f64, json_str, parse_us_date, text_or_none};
use crate::{AdapterContext, AdapterError, ListingTarget, SourceAdapter};

struct Dataset {
    id: &'static str,
    metric_type: MetricType,
    unit: &'static str,
    value_field: &'static str,
    commodity_field: Option<&'static str>,
}

const DATASETS: &[Dataset] = &[
    Dataset {
        id: "2wy9-nmz4",
        metric_type: MetricType::TrainSpeed,
        unit: "mph",
        value_field: "mph",
        commodity_field: Some("commodity"),
    },
    Dataset {
        id: "9z94-b4fw",
        metric_type: MetricType::TerminalDwell,
        unit: "hours",
        value_field: "value",
        commodity_field: None,
    },
    Dataset {
        id: "grdc-x6yk",
        metric_type: MetricType::CarsOnLine,
        unit: "carloads",
        value_field: "cars",
        commodity_field: None,
    },
    Dataset {
        id: "tb7q-kn5i",
        metric_type: MetricType::CarloadsOriginated,
        unit: "carloads",
        value_field: "carloads",
        commodity_field: Some("commodity"),
    },
];

/// Reporting mark for the railroad names USDA publishes; unknown names pass through.
pub fn normalize_railroad(name: &str) -> String {
    match name {
        "BNSF" => "BNSF",
        "Union Pacific" | "UP" => "UP",
        "CSX" | "CSXT" | "CSX Transportation" => "CSX",
        "Norfolk Southern" | "NS" => "NS",
        "Canadian National" | "CN" => "CN",
        "Canadian Pacific Kansas City" | "CPKC" | "KCS" => "CPKC",
        other => other,
    }
    .to_string()
}

fn row_to_metric(dataset: &Dataset, row: &JsonValue) -> Option<RawMetric> {
    let railroad = normalize_railroad(json_str(row, &["railroad"]).unwrap_or_default().trim());
    if railroad.is_empty() {
        return None;
    }
    match dataset.metric_type {
        MetricType::TerminalDwell => {
            if json_str(row, &["yard"]).is_some_and(|yard| yard != "System Average") {
                return None;
            }
        }
        MetricType::CarloadsOriginated => {
            if json_str(row, &["type"]).is_some_and(|kind| kind != "Originated") {
                return None;
            }
        }
        _ => {}
    }
    let report_week = parse_us_date(json_str(row, &["date"])?)?;
    let value = json_f64(row, &[dataset.value_field])?;
    let commodity = dataset
        .commodity_field
        .and_then(|field| json_str(row, &[field]))
        .and_then(text_or_none);

    Some(RawMetric {
        railroad,
        metric_type: dataset.metric_type,
        value,
        unit: dataset.unit.to_string(),
        report_week,
        commodity,
    })
}

pub struct UsdaMetricsAdapter;

impl SourceAdapter for UsdaMetricsAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::UsdaRailMetrics
    }

    fn listing_targets(&self, _ctx: &AdapterContext) -> Result<Vec<ListingTarget>, AdapterError> {
        Ok(DATASETS
            .iter()
            .map(|dataset| {
                ListingTarget::new(
                    dataset.id,
                    PageRequest::get(format!(
                        "{}/resource/{}.json?$limit=100&$order=date%20DESC",
                        SourceId::UsdaRailMetrics.base_url(),
                        dataset.id
                    ))
                    .header("Accept", "application/json"),
                )
            })
            .collect())
    }

    fn parse_listing(
        &self,
        target: &ListingTarget,
        page: &FetchedPage,
        _ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError> {
        let dataset = DATASETS
            .iter()
            .find(|d| d.id == target.label)
            .ok_or_else(|| AdapterError::Message(format!("unknown USDA dataset {}", target.label)))?;
        let rows: Vec<JsonValue> = serde_json::from_str(&page.body)
            .map_err(|e| AdapterError::Malformed(format!("usda {}: {e}", dataset.id)))?;
        Ok(RawBatch::Metrics(
            rows.iter()
                .filter_map(|row| row_to_metric(dataset, row))
                .collect(),
        ))
    }
}
