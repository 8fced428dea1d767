use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::record::RunRecord;
use crate::error::DrillError;

/// Phases of one orchestrator run.
///
/// IDLE → HEALTH_CHECK → CHECKPOINTED → SOLVED_STATUS_REFRESHED →
/// ALLOCATED → NOTIFIED → COMMITTED, with ROLLED_BACK reachable from any
/// phase after the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    HealthCheck,
    Checkpointed,
    SolvedStatusRefreshed,
    Allocated,
    Notified,
    Committed,
    RolledBack,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "IDLE"),
            RunState::HealthCheck => write!(f, "HEALTH_CHECK"),
            RunState::Checkpointed => write!(f, "CHECKPOINTED"),
            RunState::SolvedStatusRefreshed => write!(f, "SOLVED_STATUS_REFRESHED"),
            RunState::Allocated => write!(f, "ALLOCATED"),
            RunState::Notified => write!(f, "NOTIFIED"),
            RunState::Committed => write!(f, "COMMITTED"),
            RunState::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

impl RunState {
    /// True once a checkpoint exists, i.e. failures must roll back.
    pub fn holds_checkpoint(self) -> bool {
        matches!(
            self,
            RunState::Checkpointed
                | RunState::SolvedStatusRefreshed
                | RunState::Allocated
                | RunState::Notified
        )
    }

    fn successor(self) -> Option<RunState> {
        match self {
            RunState::Idle => Some(RunState::HealthCheck),
            RunState::HealthCheck => Some(RunState::Checkpointed),
            RunState::Checkpointed => Some(RunState::SolvedStatusRefreshed),
            RunState::SolvedStatusRefreshed => Some(RunState::Allocated),
            RunState::Allocated => Some(RunState::Notified),
            RunState::Notified => Some(RunState::Committed),
            RunState::Committed | RunState::RolledBack => None,
        }
    }
}

/// Validates and applies transitions to a [`RunRecord`].
pub struct StateMachine;

impl StateMachine {
    /// Moves `record` to `next`.
    ///
    /// Only the linear successor is allowed, plus `RolledBack` from a
    /// state that holds a checkpoint. Anything else is an
    /// [`DrillError::InvalidTransition`] and leaves the record unchanged.
    pub fn advance(record: &mut RunRecord, next: RunState) -> Result<(), DrillError> {
        let from = record.state;
        let allowed = match next {
            RunState::RolledBack => from.holds_checkpoint(),
            _ => from.successor() == Some(next),
        };
        if !allowed {
            return Err(DrillError::InvalidTransition {
                from: from.to_string(),
                to: next.to_string(),
            });
        }

        record.state_history.push(from);
        record.state = next;
        info!(run = %record.id, from = %from, to = %next, "run state changed");
        Ok(())
    }
}
