use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::RunState;

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Today's batch was already sent; nothing was touched.
    AlreadySent,
    /// The API looked unhealthy and its breaker is open; retry later.
    Deferred { reason: String },
    /// Nothing outstanding and the curriculum is used up.
    PlanComplete,
    Sent {
        batch: Vec<String>,
        unfinished: usize,
        fresh: usize,
        notified: bool,
    },
}

impl RunOutcome {
    pub fn token(&self) -> &'static str {
        match self {
            RunOutcome::AlreadySent => "already sent",
            RunOutcome::Deferred { .. } => "deferred",
            RunOutcome::PlanComplete => "plan complete",
            RunOutcome::Sent { .. } => "ok",
        }
    }
}

/// Audit trail of a single orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub state: RunState,
    pub state_history: Vec<RunState>,
    pub checkpoint: Option<Uuid>,
    pub outcome: Option<RunOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for RunRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRecord {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: RunState::Idle,
            state_history: Vec::new(),
            checkpoint: None,
            outcome: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Every state visited, current one last.
    pub fn transitions(&self) -> Vec<RunState> {
        let mut transitions = self.state_history.clone();
        transitions.push(self.state);
        transitions
    }

    pub fn finish(&mut self, outcome: RunOutcome) {
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> i64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_starts_idle() {
        let record = RunRecord::new();
        assert_eq!(record.state, RunState::Idle);
        assert!(record.state_history.is_empty());
        assert!(record.outcome.is_none());
        assert_eq!(record.transitions(), vec![RunState::Idle]);
    }

    #[test]
    fn finish_stamps_outcome() {
        let mut record = RunRecord::new();
        record.finish(RunOutcome::PlanComplete);
        assert_eq!(record.outcome.as_ref().map(RunOutcome::token), Some("plan complete"));
        assert!(record.finished_at.is_some());
        assert!(record.duration_ms() >= 0);
    }

    #[test]
    fn outcome_serializes_with_result_tag() {
        let outcome = RunOutcome::Sent {
            batch: vec!["two-sum".into()],
            unfinished: 0,
            fresh: 1,
            notified: true,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "sent");
        assert_eq!(json["fresh"], 1);

        let json = serde_json::to_value(RunOutcome::AlreadySent).unwrap();
        assert_eq!(json, serde_json::json!({"result": "already_sent"}));
    }
}
