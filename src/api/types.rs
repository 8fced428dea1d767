//! Wire and domain types for the submission/profile API.
//!
//! The wire structs mirror the JSON the service returns; [`SubmissionPage`]
//! and [`Submission`] are what the rest of the crate consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Epoch values below this are seconds, at or above it milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Converts a seconds-or-milliseconds epoch value into a UTC timestamp.
pub fn parse_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value < MILLIS_THRESHOLD {
        DateTime::from_timestamp(value, 0)
    } else {
        DateTime::from_timestamp_millis(value)
    }
}

/// Epoch timestamps arrive either as JSON numbers or numeric strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EpochValue {
    Int(i64),
    Text(String),
}

impl EpochValue {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            EpochValue::Int(v) => parse_epoch(*v),
            EpochValue::Text(s) => s.trim().parse::<i64>().ok().and_then(parse_epoch),
        }
    }
}

/// Body of `GET /{user}/acSubmission`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSubmissionPage {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub submission: Vec<RawSubmission>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSubmission {
    pub title_slug: String,
    pub timestamp: EpochValue,
    #[serde(default)]
    pub status_display: Option<String>,
}

/// A recent submission with a normalised timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub slug: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        self.status.eq_ignore_ascii_case("accepted")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPage {
    pub count: u32,
    pub items: Vec<Submission>,
}

impl From<RawSubmissionPage> for SubmissionPage {
    fn from(raw: RawSubmissionPage) -> Self {
        let items = raw
            .submission
            .into_iter()
            .filter_map(|s| {
                let Some(timestamp) = s.timestamp.to_datetime() else {
                    tracing::warn!(slug = %s.title_slug, "dropping submission with unreadable timestamp");
                    return None;
                };
                Some(Submission {
                    slug: s.title_slug,
                    timestamp,
                    // The acSubmission endpoint only lists accepted entries.
                    status: s.status_display.unwrap_or_else(|| "Accepted".to_string()),
                })
            })
            .collect();
        Self {
            count: raw.count,
            items,
        }
    }
}

/// Body of `GET /{user}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    #[serde(default)]
    pub ranking: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_seconds_and_millis_agree() {
        let secs = parse_epoch(1_700_000_000).unwrap();
        let millis = parse_epoch(1_700_000_000_000).unwrap();
        assert_eq!(secs, millis);
        assert_eq!(secs.to_rfc3339(), "2023-11-14T22:13:20+00:00");
    }

    #[test]
    fn submission_page_from_api_format() {
        let json = r#"{
            "count": 3,
            "submission": [
                {"title": "Two Sum", "titleSlug": "two-sum", "timestamp": "1700000000", "statusDisplay": "Accepted"},
                {"titleSlug": "add-two-numbers", "timestamp": 1700000500000},
                {"titleSlug": "broken", "timestamp": "soon"}
            ]
        }"#;
        let raw: RawSubmissionPage = serde_json::from_str(json).unwrap();
        let page = SubmissionPage::from(raw);
        assert_eq!(page.count, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].slug, "two-sum");
        assert!(page.items[1].is_accepted());
        assert_eq!(page.items[1].timestamp, parse_epoch(1_700_000_500).unwrap());
    }

    #[test]
    fn profile_without_ranking() {
        let profile: Profile = serde_json::from_str(r#"{"username":"ada"}"#).unwrap();
        assert_eq!(profile.username, "ada");
        assert_eq!(profile.ranking, None);
    }
}
