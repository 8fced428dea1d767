use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{ProgressState, Settings};

/// Snapshot of both state documents taken before a run mutates anything.
///
/// Not `Clone`: [`StateStore::rollback`](super::StateStore::rollback) takes
/// it by value, so a handle restores state at most once.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    id: Uuid,
    created_at: DateTime<Utc>,
    progress: ProgressState,
    settings: Settings,
}

impl Checkpoint {
    pub(crate) fn new(progress: ProgressState, settings: Settings) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            progress,
            settings,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_format_round_trips() {
        let checkpoint = Checkpoint::new(
            ProgressState {
                backlog_position: 9,
                pending_queue: vec!["jump-game".into()],
                version: 12,
                ..Default::default()
            },
            Settings::default(),
        );
        let json = serde_json::to_value(&checkpoint).unwrap();
        assert_eq!(json["progress"]["backlogPosition"], 9);
        assert!(json["createdAt"].is_string());

        let parsed: Checkpoint = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, checkpoint);
    }
}
