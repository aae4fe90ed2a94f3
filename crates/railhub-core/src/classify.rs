//! Rule-based classifiers. Pure functions, no I/O.

use serde::{Deserialize, Serialize};

use crate::{AdvisoryType, UpdateType};

/// Job categories in classification order. Ties go to the earlier variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobCategory {
    #[serde(rename = "Operations")]
    Operations,
    #[serde(rename = "Maintenance of Way")]
    MaintenanceOfWay,
    #[serde(rename = "Mechanical")]
    Mechanical,
    #[serde(rename = "Engineering")]
    Engineering,
    #[serde(rename = "Transportation")]
    Transportation,
    #[serde(rename = "Management")]
    Management,
    #[serde(rename = "Safety & Compliance")]
    SafetyCompliance,
    #[serde(rename = "IT & Technology")]
    ItTechnology,
    #[serde(rename = "Administrative")]
    Administrative,
    #[serde(rename = "Sales & Marketing")]
    SalesMarketing,
}

impl JobCategory {
    pub const ALL: [JobCategory; 10] = [
        JobCategory::Operations,
        JobCategory::MaintenanceOfWay,
        JobCategory::Mechanical,
        JobCategory::Engineering,
        JobCategory::Transportation,
        JobCategory::Management,
        JobCategory::SafetyCompliance,
        JobCategory::ItTechnology,
        JobCategory::Administrative,
        JobCategory::SalesMarketing,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            JobCategory::Operations => "Operations",
            JobCategory::MaintenanceOfWay => "Maintenance of Way",
            JobCategory::Mechanical => "Mechanical",
            JobCategory::Engineering => "Engineering",
            JobCategory::Transportation => "Transportation",
            JobCategory::Management => "Management",
            JobCategory::SafetyCompliance => "Safety & Compliance",
            JobCategory::ItTechnology => "IT & Technology",
            JobCategory::Administrative => "Administrative",
            JobCategory::SalesMarketing => "Sales & Marketing",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        JobCategory::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(label.trim()))
    }

    /// Lowercase substrings matched against the combined title and body.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            JobCategory::Operations => &[
                "operations",
                "dispatcher",
                "yardmaster",
                "yard",
                "terminal",
                "logistics",
                "freight",
                "shipping",
                "warehouse",
            ],
            JobCategory::MaintenanceOfWay => &[
                "maintenance of way",
                "mow",
                "track",
                "signal",
                "bridge",
                "roadway",
                "surfacing",
                "tie",
                "rail welding",
                "gandy",
            ],
            JobCategory::Mechanical => &[
                "mechanical",
                "carman",
                "car repair",
                "locomotive",
                "diesel",
                "electrician",
                "welder",
                "machinist",
                "car inspector",
                "air brake",
            ],
            JobCategory::Engineering => &[
                "engineer",
                "engineering",
                "civil engineer",
                "design",
                "surveyor",
                "structural",
                "geotechnical",
                "project engineer",
            ],
            JobCategory::Transportation => &[
                "conductor",
                "engineer train",
                "locomotive engineer",
                "trainmaster",
                "brakeman",
                "switchman",
                "train crew",
                "transportation",
            ],
            JobCategory::Management => &[
                "manager",
                "director",
                "supervisor",
                "superintendent",
                "vice president",
                "chief",
                "lead",
                "foreman",
                "management",
            ],
            JobCategory::SafetyCompliance => &[
                "safety",
                "compliance",
                "regulatory",
                "fra",
                "osha",
                "hazmat",
                "environmental",
                "risk",
                "inspection",
            ],
            JobCategory::ItTechnology => &[
                "software",
                "developer",
                "data",
                "analyst",
                "it ",
                "technology",
                "systems",
                "network",
                "cyber",
                "cloud",
                "database",
            ],
            JobCategory::Administrative => &[
                "administrative",
                "admin",
                "clerk",
                "office",
                "accounting",
                "finance",
                "hr",
                "human resources",
                "payroll",
                "receptionist",
            ],
            JobCategory::SalesMarketing => &[
                "sales",
                "marketing",
                "business development",
                "account manager",
                "customer",
                "commercial",
                "revenue",
            ],
        }
    }
}

const TITLE_WEIGHT: u32 = 3;
const BODY_WEIGHT: u32 = 1;

/// Scores every category by keyword hits and returns the best one, if any hit.
///
/// A keyword found in the title is worth `TITLE_WEIGHT`; found only in the body
/// it is worth `BODY_WEIGHT`. Only a strictly greater score replaces the
/// current best, so the earliest category wins a tie.
pub fn classify_job(title: &str, body: &str) -> Option<JobCategory> {
    let title_lower = title.to_lowercase();
    let text = format!("{title} {body}").to_lowercase();

    let mut best: Option<(JobCategory, u32)> = None;
    for category in JobCategory::ALL {
        let score: u32 = category
            .keywords()
            .iter()
            .filter(|kw| text.contains(*kw))
            .map(|kw| {
                if title_lower.contains(kw) {
                    TITLE_WEIGHT
                } else {
                    BODY_WEIGHT
                }
            })
            .sum();
        if score > best.map(|(_, s)| s).unwrap_or(0) {
            best = Some((category, score));
        }
    }
    best.map(|(category, _)| category)
}

/// First matching rule wins; titles matching nothing keep `fallback`.
const ADVISORY_RULES: &[(AdvisoryType, &[&str])] = &[
    (AdvisoryType::Embargo, &["embargo"]),
    (
        AdvisoryType::WeatherAdvisory,
        &["weather", "storm", "flood", "hurricane", "winter"],
    ),
    (
        AdvisoryType::MaintenanceNotice,
        &["maintenance", "track", "outage"],
    ),
];

pub fn classify_advisory(title: &str, fallback: AdvisoryType) -> AdvisoryType {
    let lower = title.to_lowercase();
    ADVISORY_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(kind, _)| *kind)
        .unwrap_or(fallback)
}

/// FRA accident rows: casualties or a severe incident type make a safety alert.
pub fn classify_fra_incident(incident_type: &str, killed: u32, injured: u32) -> UpdateType {
    let lower = incident_type.to_lowercase();
    let severe = ["derail", "collision", "crash", "hazmat", "release"]
        .iter()
        .any(|kw| lower.contains(kw));
    if killed > 0 || injured > 0 || severe {
        UpdateType::SafetyAlert
    } else {
        UpdateType::DataRelease
    }
}

pub fn classify_stb_title(title: &str) -> UpdateType {
    let lower = title.to_lowercase();
    let has = |kws: &[&str]| kws.iter().any(|kw| lower.contains(kw));
    if has(&["decision", "ruling"]) {
        UpdateType::Ruling
    } else if has(&["notice", "hearing"]) {
        UpdateType::Notice
    } else if has(&["data", "report", "waybill"]) {
        UpdateType::DataRelease
    } else {
        UpdateType::Notice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_hit_outweighs_body_hits() {
        // "conductor" in the title (3) beats two body-only operations hits (2).
        let category = classify_job("Conductor", "work in the yard and terminal");
        assert_eq!(category, Some(JobCategory::Transportation));
    }

    #[test]
    fn tie_goes_to_earlier_category() {
        // "yard" (Operations) and "track" (Maintenance of Way) both score 3.
        let category = classify_job("Yard Track", "");
        assert_eq!(category, Some(JobCategory::Operations));
    }

    #[test]
    fn no_keyword_hit_means_unclassified() {
        assert_eq!(classify_job("Zookeeper", "feeds penguins"), None);
    }

    #[test]
    fn keyword_in_both_title_and_body_counts_once_at_title_weight() {
        let title_only = classify_job("Welder", "");
        let both = classify_job("Welder", "certified welder needed");
        assert_eq!(title_only, Some(JobCategory::Mechanical));
        assert_eq!(both, Some(JobCategory::Mechanical));
    }

    #[test]
    fn category_labels_round_trip() {
        for category in JobCategory::ALL {
            assert_eq!(JobCategory::from_label(category.label()), Some(category));
        }
        assert_eq!(JobCategory::from_label("plumbing"), None);
    }

    #[test]
    fn advisory_rules_apply_in_order() {
        assert_eq!(
            classify_advisory("Embargo due to flood", AdvisoryType::ServiceAlert),
            AdvisoryType::Embargo
        );
        assert_eq!(
            classify_advisory("Winter Service Restriction", AdvisoryType::ServiceAlert),
            AdvisoryType::WeatherAdvisory
        );
        assert_eq!(
            classify_advisory("Track Maintenance Notice", AdvisoryType::ServiceAlert),
            AdvisoryType::MaintenanceNotice
        );
        assert_eq!(
            classify_advisory("Crew availability update", AdvisoryType::Embargo),
            AdvisoryType::Embargo
        );
    }

    #[test]
    fn fra_and_stb_types() {
        assert_eq!(classify_fra_incident("Other", 0, 0), UpdateType::DataRelease);
        assert_eq!(classify_fra_incident("Other", 0, 2), UpdateType::SafetyAlert);
        assert_eq!(classify_fra_incident("Derailment", 0, 0), UpdateType::SafetyAlert);
        assert_eq!(classify_stb_title("Decision in Docket No. FD-36500"), UpdateType::Ruling);
        assert_eq!(classify_stb_title("Public hearing scheduled"), UpdateType::Notice);
        assert_eq!(classify_stb_title("Waybill sample released"), UpdateType::DataRelease);
        assert_eq!(classify_stb_title("Chairman remarks"), UpdateType::Notice);
    }
}
