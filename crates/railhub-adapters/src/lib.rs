//! Source adapter contract, the layered listing driver, and one adapter per
//! external source.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use railhub_core::{RawBatch, SourceId};
use railhub_storage::{FetchError, FetchedPage, PageFetcher, PageRequest};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub mod parse;
pub mod sources;

pub const CRATE_NAME: &str = "railhub-adapters";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterContext {
    pub run_id: Uuid,
    /// Reference instant for date fallbacks and week arithmetic.
    pub fetched_at: DateTime<Utc>,
    pub jsearch_api_key: Option<String>,
    /// Pause between consecutive listing pages of one source.
    pub page_delay: Duration,
}

impl AdapterContext {
    pub fn new(run_id: Uuid, fetched_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            fetched_at,
            jsearch_api_key: None,
            page_delay: Duration::ZERO,
        }
    }
}

/// One page an adapter wants fetched, tagged so the parser knows which
/// layout to expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingTarget {
    pub label: String,
    pub request: PageRequest,
}

impl ListingTarget {
    pub fn new(label: impl Into<String>, request: PageRequest) -> Self {
        Self {
            label: label.into(),
            request,
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("missing credential {0}")]
    MissingCredential(&'static str),
    #[error("every listing target of {source_id:?} was unreachable: {last}")]
    Unreachable { source_id: SourceId, last: String },
    #[error("listing target {target} was cut off at the body ceiling")]
    Oversized { target: String, source: FetchError },
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> SourceId;

    fn listing_targets(&self, ctx: &AdapterContext) -> Result<Vec<ListingTarget>, AdapterError>;

    /// Maps one fetched page to raw items. An `Err` here is logged and the
    /// page contributes nothing; it never fails the source.
    fn parse_listing(
        &self,
        target: &ListingTarget,
        page: &FetchedPage,
        ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError>;

    /// Fetches every listing target and merges the parsed pages.
    ///
    /// Returns an empty batch when nothing was found and `Err` only when the
    /// source could not be reached at all.
    async fn fetch(
        &self,
        http: &dyn PageFetcher,
        ctx: &AdapterContext,
    ) -> Result<RawBatch, AdapterError> {
        let targets = self.listing_targets(ctx)?;
        fetch_listings(self, http, ctx, &targets).await
    }
}

/// Drives `targets` through `adapter`: non-success statuses and malformed
/// bodies are skipped with a warning, transport failures are only fatal when
/// every target hit one. A body over the fetcher's ceiling fails the source
/// outright so a truncated listing never reaches reconciliation.
pub async fn fetch_listings<A>(
    adapter: &A,
    http: &dyn PageFetcher,
    ctx: &AdapterContext,
    targets: &[ListingTarget],
) -> Result<RawBatch, AdapterError>
where
    A: SourceAdapter + ?Sized,
{
    let source = adapter.source_id();
    let mut batch = RawBatch::empty(source.domain());
    let mut unreachable = 0usize;
    let mut last_transport_error = None;

    for (idx, target) in targets.iter().enumerate() {
        if idx > 0 && !ctx.page_delay.is_zero() {
            tokio::time::sleep(ctx.page_delay).await;
        }

        let page = match http.fetch_page(source, &target.request).await {
            Ok(page) => page,
            Err(err) if err.is_transport() => {
                warn!(source = source.slug(), target = %target.label, error = %err, "listing target unreachable");
                unreachable += 1;
                last_transport_error = Some(err);
                continue;
            }
            Err(err) if err.is_oversized() => {
                return Err(AdapterError::Oversized {
                    target: target.label.clone(),
                    source: err,
                });
            }
            Err(err) => {
                warn!(source = source.slug(), target = %target.label, error = %err, "skipping listing target");
                continue;
            }
        };

        match adapter.parse_listing(target, &page, ctx) {
            Ok(parsed) => {
                debug!(source = source.slug(), target = %target.label, items = parsed.len(), "parsed listing");
                if let Err(domain) = batch.append(parsed) {
                    warn!(source = source.slug(), ?domain, "adapter produced a batch for the wrong domain");
                }
            }
            Err(err) => {
                warn!(source = source.slug(), target = %target.label, error = %err, "unparseable listing body");
            }
        }
    }

    if !targets.is_empty() && unreachable == targets.len() {
        let last = last_transport_error
            .map(|e: FetchError| e.to_string())
            .unwrap_or_default();
        return Err(AdapterError::Unreachable {
            source_id: source,
            last,
        });
    }

    let dropped = batch.dedup();
    if dropped > 0 {
        debug!(source = source.slug(), dropped, "dropped repeated items");
    }
    Ok(batch)
}

pub fn adapter_for(source: SourceId) -> Box<dyn SourceAdapter> {
    use sources::*;
    match source {
        SourceId::CsxCareers => Box::new(csx_careers::CsxCareersAdapter),
        SourceId::AmtrakCareers => Box::new(successfactors::SuccessFactorsAdapter::amtrak()),
        SourceId::NorfolkSouthernCareers => Box::new(norfolk_southern::NorfolkSouthernAdapter),
        SourceId::UnionPacificCareers => {
            Box::new(successfactors::SuccessFactorsAdapter::union_pacific())
        }
        SourceId::BnsfCareers => Box::new(bnsf_careers::BnsfCareersAdapter),
        SourceId::Jsearch => Box::new(jsearch::JsearchAdapter),
        SourceId::UsdaRailMetrics => Box::new(usda_metrics::UsdaMetricsAdapter),
        SourceId::FuelSurcharges => Box::new(fuel_surcharges::FuelSurchargeAdapter),
        SourceId::BnsfAdvisories => Box::new(bnsf_advisories::BnsfAdvisoriesAdapter),
        SourceId::CsxEmbargoes => Box::new(csx_embargoes::CsxEmbargoesAdapter),
        SourceId::FraSafety => Box::new(fra_safety::FraSafetyAdapter),
    }
}
