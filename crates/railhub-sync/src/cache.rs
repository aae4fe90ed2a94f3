use std::collections::HashSet;

use anyhow::{Context, Result};
use railhub_storage::Store;

/// Read-through state scoped to one run invocation: built lazily, shared by
/// every source of the run, dropped when the run returns.
#[derive(Debug, Default)]
pub struct RunCache {
    /// Fingerprints known to be stored: loaded per batch or created this run.
    fingerprints: HashSet<String>,
    /// Fingerprints already looked up, stored or not.
    checked: HashSet<String>,
    issued_slugs: HashSet<String>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up which of `batch` are already stored, across all sources, with
    /// one query. Fingerprints checked earlier in the run are not asked again.
    pub async fn load_fingerprints(&mut self, store: &dyn Store, batch: &[String]) -> Result<()> {
        let mut unchecked: Vec<String> = batch
            .iter()
            .filter(|fp| !self.checked.contains(*fp))
            .cloned()
            .collect();
        unchecked.sort();
        unchecked.dedup();
        if unchecked.is_empty() {
            return Ok(());
        }
        let stored = store
            .job_fingerprints(&unchecked)
            .await
            .context("loading job fingerprints")?;
        self.checked.extend(unchecked);
        self.fingerprints.extend(stored);
        Ok(())
    }

    pub fn has_fingerprint(&self, fingerprint: &str) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    /// Records the fingerprint of a job created during this run.
    pub fn remember_fingerprint(&mut self, fingerprint: String) {
        self.checked.insert(fingerprint.clone());
        self.fingerprints.insert(fingerprint);
    }

    /// Draws slugs from `generate` until one has not been issued this run.
    pub fn issue_slug(&mut self, mut generate: impl FnMut() -> String) -> String {
        loop {
            let slug = generate();
            if self.issued_slugs.insert(slug.clone()) {
                return slug;
            }
        }
    }
}
