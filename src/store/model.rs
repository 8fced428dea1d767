use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema;
use crate::api::Submission;

pub const MIN_DAILY_QUOTA: u32 = 1;
pub const MAX_DAILY_QUOTA: u32 = 10;

/// A versioned JSON document managed by the [`StateStore`](super::StateStore).
///
/// Version 0 means "never written"; the first successful write stamps 1.
pub trait StateDocument: Serialize + DeserializeOwned + Default + Clone {
    const DOC_ID: &'static str;

    fn version(&self) -> u64;

    fn set_version(&mut self, version: u64);

    fn set_last_modified(&mut self, at: DateTime<Utc>);

    fn set_restored_from(&mut self, from: Option<DateTime<Utc>>);

    /// Schema and invariant checks on the serialized form.
    fn validate_value(value: &Value) -> Result<(), String>;
}

/// One problem that has been sent out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentItem {
    pub slug: String,
    pub solved: bool,
    pub sent_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solved_timestamp: Option<DateTime<Utc>>,
}

impl SentItem {
    pub fn fresh(slug: &str, sent_at: DateTime<Utc>) -> Self {
        Self {
            slug: slug.to_string(),
            solved: false,
            sent_date: sent_at,
            solved_timestamp: None,
        }
    }
}

/// Settings in force when the last batch went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub daily_quota: u32,
    pub notifications_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub last_sent_date: Option<NaiveDate>,
    pub sent_items: Vec<SentItem>,
    pub backlog_position: u64,
    pub pending_queue: Vec<String>,
    pub settings_snapshot: Option<SettingsSnapshot>,
    pub version: u64,
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_from: Option<DateTime<Utc>>,
}

impl ProgressState {
    pub fn unsolved(&self) -> impl Iterator<Item = &SentItem> {
        self.sent_items.iter().filter(|item| !item.solved)
    }

    /// Marks outstanding items solved when an accepted submission for the
    /// same slug landed strictly after the item was sent. Returns how many
    /// items changed.
    pub fn mark_solved(&mut self, submissions: &[Submission]) -> usize {
        let mut marked = 0;
        for item in self.sent_items.iter_mut().filter(|item| !item.solved) {
            let solved_at = submissions
                .iter()
                .filter(|s| s.is_accepted() && s.slug == item.slug && s.timestamp > item.sent_date)
                .map(|s| s.timestamp)
                .min();
            if let Some(at) = solved_at {
                item.solved = true;
                item.solved_timestamp = Some(at);
                marked += 1;
            }
        }
        marked
    }
}

impl StateDocument for ProgressState {
    const DOC_ID: &'static str = "progress";

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn set_last_modified(&mut self, at: DateTime<Utc>) {
        self.last_modified = Some(at);
    }

    fn set_restored_from(&mut self, from: Option<DateTime<Utc>>) {
        self.restored_from = from;
    }

    fn validate_value(value: &Value) -> Result<(), String> {
        schema::validate_progress(value)
    }
}

/// User-adjustable settings, stored as the `settings` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub daily_quota: u32,
    pub notifications_enabled: bool,
    pub version: u64,
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_from: Option<DateTime<Utc>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            daily_quota: MIN_DAILY_QUOTA,
            notifications_enabled: true,
            version: 0,
            last_modified: None,
            restored_from: None,
        }
    }
}

impl Settings {
    pub fn clamp_quota(requested: i64) -> u32 {
        requested.clamp(MIN_DAILY_QUOTA as i64, MAX_DAILY_QUOTA as i64) as u32
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            daily_quota: self.daily_quota,
            notifications_enabled: self.notifications_enabled,
        }
    }
}

impl StateDocument for Settings {
    const DOC_ID: &'static str = "settings";

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn set_last_modified(&mut self, at: DateTime<Utc>) {
        self.last_modified = Some(at);
    }

    fn set_restored_from(&mut self, from: Option<DateTime<Utc>>) {
        self.restored_from = from;
    }

    fn validate_value(value: &Value) -> Result<(), String> {
        schema::validate_settings(value)
    }
}
