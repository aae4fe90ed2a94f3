//! Content fingerprints and URL slugs.

use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const SLUG_BASE_MAX: usize = 80;
pub const COMPANY_SLUG_MAX: usize = 60;
pub const SLUG_SUFFIX_LEN: usize = 8;

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Lowercased, trimmed `title|employer|city` hashed to 64 hex chars.
pub fn content_fingerprint(title: &str, employer: &str, city: Option<&str>) -> String {
    let normalized = [title, employer, city.unwrap_or("")]
        .iter()
        .map(|part| part.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join("|");
    sha256_hex(&normalized)
}

/// Short stable token for sources that publish no identifier of their own.
pub fn short_hash(input: &str) -> String {
    let mut digest = sha256_hex(input);
    digest.truncate(12);
    digest
}

/// Lowercase, collapse every run of non `[a-z0-9]` into one `-`, trim dashes,
/// cut to `max_len`.
pub fn slugify(input: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }
    // ASCII only past this point, so byte truncation is char-safe.
    out.truncate(max_len);
    out.trim_end_matches('-').to_string()
}

pub fn opaque_suffix() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(SLUG_SUFFIX_LEN);
    id
}

fn with_suffix(base: String) -> String {
    let suffix = opaque_suffix();
    if base.is_empty() {
        suffix
    } else {
        format!("{base}-{suffix}")
    }
}

pub fn job_slug(title: &str, company: &str, city: Option<&str>, state: Option<&str>) -> String {
    let parts: Vec<&str> = [Some(title), Some(company), city, state]
        .into_iter()
        .flatten()
        .filter(|p| !p.is_empty())
        .collect();
    with_suffix(slugify(&parts.join("-"), SLUG_BASE_MAX))
}

pub fn company_slug(company: &str) -> String {
    slugify(company, COMPANY_SLUG_MAX)
}

pub fn advisory_slug(title: &str, railroad: &str) -> String {
    with_suffix(slugify(&format!("{railroad}-{title}"), SLUG_BASE_MAX))
}

pub fn regulatory_slug(title: &str, agency: &str) -> String {
    with_suffix(slugify(&format!("{agency}-{title}"), SLUG_BASE_MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_case_and_padding() {
        let a = content_fingerprint("Conductor", "Union Pacific", Some("Omaha"));
        let b = content_fingerprint("  conductor ", "UNION PACIFIC", Some("omaha "));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_fingerprint("Conductor", "Union Pacific", None));
    }

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("  Track -- Maintenance / Notice!  ", 80), "track-maintenance-notice");
        assert_eq!(slugify("Café Düsseldorf", 80), "caf-d-sseldorf");
        assert_eq!(slugify("abc def", 4), "abc");
    }

    #[test]
    fn colliding_titles_get_distinct_slugs() {
        let a = advisory_slug("Track Maintenance Notice", "BNSF");
        let b = advisory_slug("Track Maintenance Notice", "BNSF");
        assert_ne!(a, b);
        assert!(a.starts_with("bnsf-track-maintenance-notice-"));
        assert_eq!(a.len(), "bnsf-track-maintenance-notice-".len() + SLUG_SUFFIX_LEN);
    }

    #[test]
    fn job_slug_skips_missing_location_parts() {
        let slug = job_slug("Conductor", "Union Pacific", Some("Omaha"), None);
        assert!(slug.starts_with("conductor-union-pacific-omaha-"));
        let base = &slug[..slug.len() - SLUG_SUFFIX_LEN - 1];
        assert!(base.len() <= SLUG_BASE_MAX);
    }

    #[test]
    fn company_slug_has_no_suffix() {
        assert_eq!(company_slug("Norfolk Southern Corp."), "norfolk-southern-corp");
        assert!(company_slug(&"x".repeat(100)).len() == COMPANY_SLUG_MAX);
    }

    #[test]
    fn regulatory_slug_is_prefixed_by_agency() {
        assert!(regulatory_slug("Decision", "STB").starts_with("stb-decision-"));
    }

    #[test]
    fn short_hash_is_stable() {
        assert_eq!(short_hash("abc"), short_hash("abc"));
        assert_eq!(short_hash("abc").len(), 12);
    }
}
