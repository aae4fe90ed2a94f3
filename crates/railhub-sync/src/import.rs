//! Bulk facility import from delimited text with a header row.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use railhub_core::{
    Facility, FacilityCapabilities, FacilityDraft, FacilityLocation, FacilityType, RunLedgerEntry,
    SourceCounts, SourceKind,
};
use railhub_storage::Store;
use serde::Serialize;
use tracing::{info, warn};

pub const DEFAULT_IMPORT_SOURCE: &str = "manual-import";
pub const MAX_REPORTED_ERRORS: usize = 10;

type Row = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub success: bool,
    pub imported: usize,
    pub updated: usize,
    pub failed: usize,
    pub total: usize,
    /// First [`MAX_REPORTED_ERRORS`] row errors.
    pub errors: Vec<String>,
}

fn field<'r>(row: &'r Row, name: &str) -> Option<&'r str> {
    row.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn owned(row: &Row, name: &str) -> Option<String> {
    field(row, name).map(str::to_string)
}

fn truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("yes") || value.eq_ignore_ascii_case("true")
}

/// True when any of `names` holds a Yes/true value.
fn flag(row: &Row, names: &[&str]) -> bool {
    names.iter().any(|name| field(row, name).is_some_and(truthy))
}

fn list(row: &Row, name: &str) -> Vec<String> {
    field(row, name)
        .map(|v| {
            v.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn count(row: &Row, name: &str) -> Option<i32> {
    field(row, name).and_then(|v| v.parse().ok())
}

/// "BNSF - Class I, UP" keeps the part of each entry before its first dash.
fn railroads(row: &Row) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for entry in field(row, "railroads").unwrap_or_default().split([',', ';']) {
        let name = entry.split('-').next().unwrap_or_default().trim();
        if !name.is_empty() && !out.iter().any(|r| r == name) {
            out.push(name.to_string());
        }
    }
    out
}

const HOURS_COLUMNS: [&str; 7] = [
    "hours_mon", "hours_tue", "hours_wed", "hours_thu", "hours_fri", "hours_sat", "hours_sun",
];

pub fn draft_from_row(row: &Row) -> Result<FacilityDraft> {
    let Some(external_id) = owned(row, "id").or_else(|| owned(row, "external_id")) else {
        bail!("missing id");
    };
    let Some(name) = owned(row, "name") else {
        bail!("facility {external_id} has no name");
    };

    let facility_type = match field(row, "type") {
        Some(t) if t.eq_ignore_ascii_case("storage") => FacilityType::Storage,
        _ => FacilityType::Transload,
    };

    let hours = HOURS_COLUMNS.map(|column| owned(row, column));
    let is_24_7 = hours[0].as_deref().is_some_and(|h| h.contains("24")) || flag(row, &["is_24_7"]);

    Ok(FacilityDraft {
        external_id,
        name,
        description: owned(row, "description"),
        phone: owned(row, "phone"),
        website: owned(row, "url"),
        about: owned(row, "about"),
        facility_type,
        location: FacilityLocation {
            street_address: owned(row, "street_address"),
            city: owned(row, "city"),
            state: owned(row, "state"),
            zip_code: owned(row, "zip_code"),
            country: owned(row, "country").unwrap_or_else(|| "US".to_string()),
        },
        capabilities: FacilityCapabilities {
            track_capacity: count(row, "track_capacity"),
            railcar_spot_count: count(row, "railcar_spot_count"),
            hazmat_certified: flag(row, &["hazmat_handling", "hazmat_certified"]),
            food_grade: flag(row, &["food_grade"]),
            kosher_certified: flag(row, &["kosher_certification", "kosher_certified"]),
            has_scale: flag(row, &["onsite_scale", "has_scale"]),
            has_railcar_storage: flag(row, &["onsite_railcar_storage", "has_railcar_storage"]),
            is_24_7,
            weight_restricted_263k: flag(row, &["weight_restricted_263k"]),
            weight_restricted_286k: flag(row, &["weight_restricted_286k"]),
            equipment: list(row, "equipment"),
            storage_options: list(row, "storage_options"),
            transfer_modes: list(row, "transfer_modes"),
            product_types: list(row, "product_types"),
            hours,
        },
        railroads: railroads(row),
    })
}

/// Parses every record up front; a record the reader cannot decode becomes
/// that row's error.
fn read_rows(content: &[u8]) -> Result<Vec<Result<Row>>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content);
    reader.headers().context("reading header row")?;
    Ok(reader
        .deserialize::<Row>()
        .map(|record| record.map_err(anyhow::Error::from))
        .collect())
}

#[derive(Clone)]
pub struct FacilityImporter {
    store: Arc<dyn Store>,
}

impl FacilityImporter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates or updates one facility per row, recorded as a ledger entry
    /// against `source_name`.
    pub async fn import(&self, content: &[u8], source_name: &str) -> Result<ImportSummary> {
        let rows = read_rows(content)?;
        let total = rows.len();
        let drafts: Vec<Result<FacilityDraft>> = rows
            .into_iter()
            .map(|row| row.and_then(|r| draft_from_row(&r)))
            .collect();

        let source = self
            .store
            .upsert_source(source_name, SourceKind::Import, "")
            .await
            .with_context(|| format!("upserting import source {source_name}"))?;
        let mut entry = RunLedgerEntry::start(source.id, Utc::now());
        self.store
            .open_run(&entry)
            .await
            .context("opening import ledger entry")?;

        let external_ids: Vec<String> = drafts
            .iter()
            .filter_map(|d| d.as_ref().ok().map(|d| d.external_id.clone()))
            .collect();
        let mut existing = self
            .store
            .facility_ids_by_external_id(&external_ids)
            .await
            .context("loading facilities by external id")?;

        let (mut imported, mut updated, mut failed) = (0usize, 0usize, 0usize);
        let mut errors = Vec::new();
        for (idx, draft) in drafts.into_iter().enumerate() {
            let now = Utc::now();
            let result = match draft {
                Err(err) => Err(err),
                Ok(draft) => match existing.get(&draft.external_id).copied() {
                    Some(id) => self
                        .store
                        .update_facility(id, &draft, now)
                        .await
                        .map(|()| false),
                    None => {
                        let facility = Facility::from_draft(draft, source.id, now);
                        match self.store.insert_facility(&facility).await {
                            Ok(()) => {
                                existing.insert(facility.external_id.clone(), facility.id);
                                Ok(true)
                            }
                            Err(err) => Err(err),
                        }
                    }
                },
            };
            match result {
                Ok(true) => imported += 1,
                Ok(false) => updated += 1,
                Err(err) => {
                    failed += 1;
                    let message = format!("Row {}: {err:#}", idx + 1);
                    warn!(%message, "import row failed");
                    errors.push(message);
                }
            }
        }

        errors.truncate(MAX_REPORTED_ERRORS);
        let counts = SourceCounts {
            found: SourceCounts::clamp(total),
            created: SourceCounts::clamp(imported),
            updated: SourceCounts::clamp(updated),
            failed: SourceCounts::clamp(failed),
        };
        let finished = Utc::now();
        if total > 0 && failed == total {
            entry.fail(counts, errors.join("\n"), finished);
        } else {
            entry.complete(counts, finished);
            if !errors.is_empty() {
                entry.error_message = Some(errors.join("\n"));
            }
        }
        self.store
            .close_run(&entry)
            .await
            .context("closing import ledger entry")?;
        if let Err(err) = self
            .store
            .record_source_fetch(source.id, finished, i64::try_from(imported + updated).unwrap_or(i64::MAX))
            .await
        {
            warn!(error = %format!("{err:#}"), "could not record import on source");
        }

        info!(source = source_name, total, imported, updated, failed, "import finished");
        Ok(ImportSummary {
            success: true,
            imported,
            updated,
            failed,
            total,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railhub_core::RunStatus;
    use railhub_storage::MemoryStore;

    const CSV: &str = "\
id,name,type,city,state,hazmat_handling,food_grade,equipment,railroads,hours_mon,track_capacity
tl-1,Omaha Transload,Transload,Omaha,NE,Yes,true,Forklift; Conveyor ;,\"BNSF - Class I, UP;BNSF\",24 hours,12
,Nameless Yard,Storage,Lincoln,NE,No,No,,,,
st-2,Lincoln Storage,storage,Lincoln,NE,No,No,,CPKC,8-5,abc
";

    #[test]
    fn rows_map_onto_drafts() {
        let rows = read_rows(CSV.as_bytes()).unwrap();
        let row = rows[0].as_ref().unwrap();
        let draft = draft_from_row(row).unwrap();

        assert_eq!(draft.external_id, "tl-1");
        assert_eq!(draft.facility_type, FacilityType::Transload);
        assert_eq!(draft.location.country, "US");
        assert!(draft.capabilities.hazmat_certified);
        assert!(draft.capabilities.food_grade);
        assert!(draft.capabilities.is_24_7);
        assert_eq!(draft.capabilities.track_capacity, Some(12));
        assert_eq!(draft.capabilities.equipment, vec!["Forklift", "Conveyor"]);
        assert_eq!(draft.railroads, vec!["BNSF", "UP"]);
        assert_eq!(draft.capabilities.hours[0].as_deref(), Some("24 hours"));

        let storage = draft_from_row(rows[2].as_ref().unwrap()).unwrap();
        assert_eq!(storage.facility_type, FacilityType::Storage);
        assert_eq!(storage.capabilities.track_capacity, None);
        assert!(!storage.capabilities.is_24_7);

        let err = draft_from_row(rows[1].as_ref().unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "missing id");
    }

    #[tokio::test]
    async fn import_creates_then_updates_and_reports_row_errors() {
        let store = Arc::new(MemoryStore::new());
        let importer = FacilityImporter::new(store.clone());

        let first = importer.import(CSV.as_bytes(), DEFAULT_IMPORT_SOURCE).await.unwrap();
        assert_eq!(
            (first.imported, first.updated, first.failed, first.total),
            (2, 0, 1, 3)
        );
        assert_eq!(first.errors, vec!["Row 2: missing id".to_string()]);

        let again = importer.import(CSV.as_bytes(), DEFAULT_IMPORT_SOURCE).await.unwrap();
        assert_eq!((again.imported, again.updated), (0, 2));
        assert_eq!(store.facilities().await.len(), 2);

        let ledger = store.ledger().await;
        assert_eq!(ledger.len(), 2);
        assert!(ledger.iter().all(|e| e.status == RunStatus::Completed));
        assert_eq!(ledger[0].counts.failed, 1);
        assert_eq!(store.sources().await[0].kind, SourceKind::Import);
    }

    #[tokio::test]
    async fn all_rows_failing_fails_the_entry_and_caps_errors() {
        let store = Arc::new(MemoryStore::new());
        let importer = FacilityImporter::new(store.clone());
        let mut csv = String::from("id,name\n");
        for _ in 0..12 {
            csv.push_str(",Unnamed\n");
        }

        let summary = importer.import(csv.as_bytes(), "railroad-csv").await.unwrap();
        assert_eq!(summary.failed, 12);
        assert_eq!(summary.errors.len(), MAX_REPORTED_ERRORS);

        let ledger = store.ledger().await;
        assert_eq!(ledger[0].status, RunStatus::Failed);
        assert_eq!(store.sources().await[0].name, "railroad-csv");
    }

    #[tokio::test]
    async fn write_failures_are_isolated_per_row() {
        let store = Arc::new(MemoryStore::new());
        store.fail_writes_for("st-2").await;
        let importer = FacilityImporter::new(store.clone());

        let summary = importer.import(CSV.as_bytes(), DEFAULT_IMPORT_SOURCE).await.unwrap();
        assert_eq!((summary.imported, summary.failed), (1, 2));
        assert!(summary.errors[1].starts_with("Row 3: "));
    }
}
