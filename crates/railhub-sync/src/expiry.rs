use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use railhub_core::Domain;
use railhub_storage::Store;
use tracing::{info, warn};

/// Flips canonical records inactive once their validity window has passed.
/// Never deletes; a second sweep at the same instant transitions nothing.
#[derive(Clone)]
pub struct ExpirySweeper {
    store: Arc<dyn Store>,
    job_max_age: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn Store>, job_max_age_days: i64) -> Self {
        Self {
            store,
            job_max_age: Duration::days(job_max_age_days),
        }
    }

    /// Count of records deactivated across `domains`. Store errors are logged
    /// and count as zero.
    pub async fn sweep(&self, domains: &[Domain], now: DateTime<Utc>) -> u64 {
        let mut total = 0;
        for domain in domains {
            let result = match domain {
                Domain::Job => self.store.expire_jobs(now, now - self.job_max_age).await,
                Domain::Advisory => self.store.expire_advisories(now).await,
                _ => Ok(0),
            };
            match result {
                Ok(count) => {
                    if count > 0 {
                        info!(?domain, count, "expired records");
                    }
                    total += count;
                }
                Err(err) => warn!(?domain, error = %format!("{err:#}"), "expiry sweep failed"),
            }
        }
        total
    }
}
