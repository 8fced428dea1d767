use thiserror::Error;
use uuid::Uuid;

use crate::api::ApiError;

/// Tagged error category, fixed where the error is constructed.
///
/// Callers branch on this instead of on error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Timeouts, resets, 5xx and rate limits.
    TransientNetwork,
    /// 4xx other than 429; never retried.
    NonRetryableClient,
    /// Rejected by an open circuit breaker without attempting the call.
    CircuitOpen,
    /// A document failed schema or invariant checks before any write.
    Validation,
    /// Restoring a checkpoint failed; state consistency is unknown.
    RollbackFailure,
    /// The strategy's total time budget ran out.
    Timeout,
    /// Every attempt of the strategy failed with a transient error.
    ExhaustedRetries,
    /// Another writer got there first.
    Conflict,
    /// Local document store failures (I/O, corrupt JSON).
    Storage,
    /// Bad configuration or an internal contract violation.
    Config,
}

/// How the retry engine treats a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Slow first response after idling: timeouts, resets, 502/503/504.
    ColdStart,
    /// Worth retrying, but not a wake-up symptom.
    Transient,
    /// Retrying cannot help.
    NonRetryable,
}

#[derive(Debug, Error)]
pub enum DrillError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("attempt timed out after {after_ms}ms")]
    AttemptTimeout { after_ms: u64 },

    #[error("circuit breaker open for {component}, retry in {retry_in_ms}ms")]
    CircuitOpen { component: String, retry_in_ms: u64 },

    #[error("{strategy}: gave up after {attempts} attempts: {source}")]
    ExhaustedRetries {
        strategy: String,
        attempts: u32,
        #[source]
        source: Box<DrillError>,
    },

    #[error("{strategy}: time budget of {budget_ms}ms spent after {attempts} attempts")]
    Timeout {
        strategy: String,
        attempts: u32,
        budget_ms: u64,
    },

    #[error("validation failed for {document}: {reason}")]
    Validation { document: String, reason: String },

    #[error("version conflict on {document}: expected {expected:?}, found {found:?}")]
    VersionConflict {
        document: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("{document} moved from version {expected} to {found} during the run")]
    StaleState {
        document: String,
        expected: u64,
        found: u64,
    },

    #[error("another run already committed today's batch")]
    ConcurrentRun,

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("run rolled back to checkpoint {checkpoint}: {source}")]
    RolledBack {
        checkpoint: Uuid,
        #[source]
        source: Box<DrillError>,
    },

    #[error("rollback to checkpoint {checkpoint} failed ({rollback}) while handling: {cause}")]
    RollbackFailure {
        checkpoint: Uuid,
        cause: Box<DrillError>,
        rollback: Box<DrillError>,
    },

    #[error("checkpoint {checkpoint} from an unfinished run is pending; run `drillbot restore` first")]
    RestorePending { checkpoint: Uuid },

    #[error("invalid run transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("unknown retry strategy: {0}")]
    UnknownStrategy(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DrillError {
    pub fn validation(document: &str, reason: impl Into<String>) -> Self {
        DrillError::Validation {
            document: document.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DrillError::Api(e) => e.kind(),
            DrillError::AttemptTimeout { .. } | DrillError::Notification(_) => {
                ErrorKind::TransientNetwork
            }
            DrillError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            DrillError::ExhaustedRetries { .. } => ErrorKind::ExhaustedRetries,
            DrillError::Timeout { .. } => ErrorKind::Timeout,
            DrillError::Validation { .. } => ErrorKind::Validation,
            DrillError::VersionConflict { .. }
            | DrillError::StaleState { .. }
            | DrillError::ConcurrentRun => ErrorKind::Conflict,
            DrillError::RolledBack { source, .. } => source.kind(),
            DrillError::RollbackFailure { .. } | DrillError::RestorePending { .. } => {
                ErrorKind::RollbackFailure
            }
            DrillError::InvalidTransition { .. }
            | DrillError::UnknownStrategy(_)
            | DrillError::Config(_) => ErrorKind::Config,
            DrillError::Io(_) | DrillError::Json(_) => ErrorKind::Storage,
        }
    }

    pub fn failure_class(&self) -> FailureClass {
        match self {
            DrillError::Api(e) => e.failure_class(),
            DrillError::AttemptTimeout { .. } => FailureClass::ColdStart,
            DrillError::VersionConflict { .. }
            | DrillError::Notification(_)
            | DrillError::Io(_) => FailureClass::Transient,
            _ => FailureClass::NonRetryable,
        }
    }

    /// Minimum wait the server asked for, if any.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            DrillError::Api(ApiError::RateLimited { retry_after_ms }) => {
                Some(std::time::Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }

    /// The innermost error once rollback and retry wrappers are peeled off.
    pub fn root_cause(&self) -> &DrillError {
        match self {
            DrillError::RolledBack { source, .. } | DrillError::ExhaustedRetries { source, .. } => {
                source.root_cause()
            }
            _ => self,
        }
    }

    /// Compact token for CLI callers; details go to the log.
    pub fn status_token(&self) -> &'static str {
        match self.kind() {
            ErrorKind::CircuitOpen => "circuit open",
            ErrorKind::RollbackFailure => "critical error",
            _ => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolled_back_keeps_kind_of_cause() {
        let err = DrillError::RolledBack {
            checkpoint: Uuid::new_v4(),
            source: Box::new(DrillError::validation("progress", "empty slug")),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(matches!(err.root_cause(), DrillError::Validation { .. }));
    }

    #[test]
    fn api_status_drives_failure_class() {
        let not_found = DrillError::Api(ApiError::Status {
            status: 404,
            message: "no such user".into(),
        });
        assert_eq!(not_found.failure_class(), FailureClass::NonRetryable);
        assert_eq!(not_found.kind(), ErrorKind::NonRetryableClient);

        let gateway = DrillError::Api(ApiError::Status {
            status: 503,
            message: "waking up".into(),
        });
        assert_eq!(gateway.failure_class(), FailureClass::ColdStart);
        assert_eq!(gateway.kind(), ErrorKind::TransientNetwork);
    }

    #[test]
    fn rate_limit_is_transient_with_retry_after() {
        let err = DrillError::Api(ApiError::RateLimited {
            retry_after_ms: 2500,
        });
        assert_eq!(err.failure_class(), FailureClass::Transient);
        assert_eq!(err.retry_after(), Some(std::time::Duration::from_millis(2500)));
    }

    #[test]
    fn status_tokens() {
        let open = DrillError::CircuitOpen {
            component: "api".into(),
            retry_in_ms: 10,
        };
        assert_eq!(open.status_token(), "circuit open");

        let fatal = DrillError::RollbackFailure {
            checkpoint: Uuid::new_v4(),
            cause: Box::new(DrillError::Notification("smtp down".into())),
            rollback: Box::new(DrillError::Io(std::io::Error::other("disk full"))),
        };
        assert_eq!(fatal.status_token(), "critical error");
        assert_eq!(DrillError::ConcurrentRun.status_token(), "error");
    }

    #[test]
    fn validation_is_never_retried() {
        let err = DrillError::validation("settings", "dailyQuota out of range");
        assert_eq!(err.failure_class(), FailureClass::NonRetryable);
        assert_eq!(
            err.to_string(),
            "validation failed for settings: dailyQuota out of range"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DrillError>();
    }
}
