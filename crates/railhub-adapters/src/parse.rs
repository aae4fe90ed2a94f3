//! Text, date, location and JSON helpers shared by the source adapters.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value as JsonValue;

use crate::AdapterError;

pub fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Message(format!("selector {css}: {e}")))
}

pub fn text_or_none(value: impl AsRef<str>) -> Option<String> {
    let collapsed = collapse_ws(value.as_ref());
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

pub fn collapse_ws(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn element_text(el: ElementRef<'_>) -> String {
    collapse_ws(&el.text().collect::<String>())
}

pub fn select_first_text(scope: ElementRef<'_>, css: &str) -> Result<Option<String>, AdapterError> {
    let sel = selector(css)?;
    Ok(scope
        .select(&sel)
        .next()
        .and_then(|n| text_or_none(n.text().collect::<String>())))
}

pub fn select_first_attr(
    scope: ElementRef<'_>,
    css: &str,
    attr: &str,
) -> Result<Option<String>, AdapterError> {
    let sel = selector(css)?;
    Ok(scope
        .select(&sel)
        .next()
        .and_then(|n| n.value().attr(attr))
        .and_then(|s| text_or_none(s)))
}

/// Visible text of an HTML fragment with entities decoded.
pub fn strip_html(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    collapse_ws(&parsed.root_element().text().collect::<String>())
}

pub fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_str()
}

/// Numbers that may arrive as JSON numbers or as strings with thousands separators.
pub fn json_f64(value: &JsonValue, path: &[&str]) -> Option<f64> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    match cur {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    }
}

fn written_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z]+ \d{1,2},? \d{4})").expect("valid written date regex"))
}

fn numeric_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,2}[-/]\d{1,2}[-/]\d{2,4})").expect("valid numeric date regex")
    })
}

/// Parses "Feb 20, 2026", "February 20 2026", "02/20/2026", "2-20-26" and
/// ISO dates or timestamps.
pub fn parse_us_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.date_naive());
    }
    if let Ok(ts) = DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(ts.date_naive());
    }
    if let Some(date_part) = trimmed.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
            return Some(date);
        }
    }
    let normalized = trimmed.replace(',', "");
    const FORMATS: &[&str] = &[
        "%b %d %Y", "%B %d %Y", "%m/%d/%Y", "%m-%d-%Y", "%m/%d/%y", "%m-%d-%y",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&normalized, fmt).ok())
}

/// First "Month D, YYYY" date found anywhere in `text`.
pub fn find_written_date(text: &str) -> Option<NaiveDate> {
    written_date_re()
        .captures_iter(text)
        .find_map(|c| parse_us_date(&c[1]))
}

/// First written or numeric date found anywhere in `text`.
pub fn find_any_date(text: &str) -> Option<NaiveDate> {
    let numeric = numeric_date_re()
        .captures(text)
        .and_then(|c| parse_us_date(&c[1]));
    numeric.or_else(|| find_written_date(text))
}

pub fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

const STATES: &[(&str, &str)] = &[
    ("alabama", "AL"),
    ("alaska", "AK"),
    ("arizona", "AZ"),
    ("arkansas", "AR"),
    ("california", "CA"),
    ("colorado", "CO"),
    ("connecticut", "CT"),
    ("delaware", "DE"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("hawaii", "HI"),
    ("idaho", "ID"),
    ("illinois", "IL"),
    ("indiana", "IN"),
    ("iowa", "IA"),
    ("kansas", "KS"),
    ("kentucky", "KY"),
    ("louisiana", "LA"),
    ("maine", "ME"),
    ("maryland", "MD"),
    ("massachusetts", "MA"),
    ("michigan", "MI"),
    ("minnesota", "MN"),
    ("mississippi", "MS"),
    ("missouri", "MO"),
    ("montana", "MT"),
    ("nebraska", "NE"),
    ("nevada", "NV"),
    ("new hampshire", "NH"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("new york", "NY"),
    ("north carolina", "NC"),
    ("north dakota", "ND"),
    ("ohio", "OH"),
    ("oklahoma", "OK"),
    ("oregon", "OR"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("south carolina", "SC"),
    ("south dakota", "SD"),
    ("tennessee", "TN"),
    ("texas", "TX"),
    ("utah", "UT"),
    ("vermont", "VT"),
    ("virginia", "VA"),
    ("washington", "WA"),
    ("west virginia", "WV"),
    ("wisconsin", "WI"),
    ("wyoming", "WY"),
];

pub fn is_state_code(code: &str) -> bool {
    STATES.iter().any(|(_, c)| *c == code)
}

/// Two-letter code for a state name or code; `None` when unrecognised.
pub fn state_code(name: &str) -> Option<&'static str> {
    let trimmed = name.trim();
    let lower = trimmed.to_lowercase();
    STATES
        .iter()
        .find(|(full, code)| *full == lower || code.eq_ignore_ascii_case(trimmed))
        .map(|(_, code)| *code)
}

fn city_state_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+?),\s*([A-Z]{2})\b").expect("valid city/state regex"))
}

/// "Omaha, NE 68000" and "Richmond,  VA, US, 23228" to (city, state).
pub fn split_city_state(location: &str) -> (Option<String>, Option<String>) {
    let trimmed = collapse_ws(location);
    match city_state_re().captures(&trimmed) {
        Some(caps) => (text_or_none(&caps[1]), Some(caps[2].to_string())),
        None => (None, None),
    }
}

fn state_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Z]{2})\b").expect("valid state token regex"))
}

const REGIONS: &[&str] = &[
    "Midwest",
    "Southwest",
    "Southeast",
    "Northeast",
    "Northwest",
    "Pacific",
    "Gulf",
    "Central",
];

/// Area an advisory title names: a US state code, else a broad region.
pub fn affected_area(title: &str) -> Option<String> {
    state_token_re()
        .captures_iter(title)
        .map(|c| c[1].to_string())
        .find(|code| is_state_code(code))
        .or_else(|| {
            REGIONS
                .iter()
                .find(|region| title.contains(*region))
                .map(|region| region.to_string())
        })
}

pub fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trailing numeric path segment, e.g. the id in `/job/Omaha-Conductor/1358457600/`.
pub fn trailing_numeric_id(path: &str) -> Option<String> {
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    (!last.is_empty() && last.chars().all(|c| c.is_ascii_digit())).then(|| last.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn us_dates_in_every_published_shape() {
        let feb20 = NaiveDate::from_ymd_opt(2026, 2, 20).unwrap();
        assert_eq!(parse_us_date("Feb 20, 2026"), Some(feb20));
        assert_eq!(parse_us_date("February 20 2026"), Some(feb20));
        assert_eq!(parse_us_date("02/20/2026"), Some(feb20));
        assert_eq!(parse_us_date("2026-02-20T17:05:18.000+0000"), Some(feb20));
        assert_eq!(parse_us_date("2026-02-20T00:00:00.000"), Some(feb20));
        assert_eq!(parse_us_date("soon"), None);
    }

    #[test]
    fn dates_are_found_inside_text() {
        assert_eq!(
            find_written_date("Issued January 5, 2026 for all lanes"),
            NaiveDate::from_ymd_opt(2026, 1, 5)
        );
        assert_eq!(
            find_any_date("effective 3/1/2026"),
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
    }

    #[test]
    fn locations_split_into_city_and_state() {
        assert_eq!(
            split_city_state("Richmond,  VA, US, 23228"),
            (Some("Richmond".into()), Some("VA".into()))
        );
        assert_eq!(split_city_state("Various"), (None, None));
        assert_eq!(state_code("North Dakota"), Some("ND"));
        assert_eq!(state_code("tx"), Some("TX"));
        assert_eq!(state_code("Ontario"), None);
    }

    #[test]
    fn strip_html_decodes_entities() {
        assert_eq!(strip_html("<b>Track&nbsp;work</b> &amp; <i>signals</i>"), "Track work & signals");
    }

    #[test]
    fn json_numbers_tolerate_string_encoding() {
        let row = json!({"cars": "12,345", "mph": 24.5});
        assert_eq!(json_f64(&row, &["cars"]), Some(12345.0));
        assert_eq!(json_f64(&row, &["mph"]), Some(24.5));
        assert_eq!(json_f64(&row, &["missing"]), None);
    }

    #[test]
    fn advisory_areas_prefer_state_codes() {
        assert_eq!(affected_area("Flooding near Omaha, NE"), Some("NE".into()));
        assert_eq!(affected_area("BNSF update: Gulf Coast storm"), Some("Gulf".into()));
        assert_eq!(affected_area("UP interchange delays"), None);
    }

    #[test]
    fn misc_helpers() {
        assert_eq!(title_case("SAN ANTONI"), "San Antoni");
        assert_eq!(
            trailing_numeric_id("/job/Omaha-Conductor-NE-68000/1358457600/"),
            Some("1358457600".into())
        );
        assert_eq!(trailing_numeric_id("/job/no-id/"), None);
    }
}
