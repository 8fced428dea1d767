//! Error type for the submission API client.
//!
//! [`ApiError`] keeps the HTTP status so retry decisions are made from
//! structured data instead of error text.

use thiserror::Error;

use crate::error::{ErrorKind, FailureClass};

/// Errors that can occur while talking to the submission API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 429. `retry_after_ms` is how long the server asked us to wait.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other non-success status, with the response body as message.
    #[error("API error (status {status}): {message}")]
    Status { status: u16, message: String },

    /// Transport failure (DNS, refused connection, reset, client timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The body did not have the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            ApiError::RateLimited { .. } => FailureClass::Transient,
            ApiError::Status { status, .. } => match status {
                502..=504 => FailureClass::ColdStart,
                400..=499 => FailureClass::NonRetryable,
                _ => FailureClass::Transient,
            },
            ApiError::Network(e) if e.is_timeout() || e.is_connect() => FailureClass::ColdStart,
            ApiError::Network(e) if e.is_builder() => FailureClass::NonRetryable,
            ApiError::Network(_) => FailureClass::Transient,
            // Sleeping hosts tend to answer with an HTML splash page first.
            ApiError::Decode(_) => FailureClass::Transient,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.failure_class() {
            FailureClass::NonRetryable => ErrorKind::NonRetryableClient,
            FailureClass::ColdStart | FailureClass::Transient => ErrorKind::TransientNetwork,
        }
    }
}
