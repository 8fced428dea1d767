use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

use super::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use super::metrics::{MetricsSnapshot, RetryMetrics};
use super::strategy::{RetryStrategy, StrategySet};
use crate::error::{DrillError, FailureClass};

/// Runs operations under a named [`RetryStrategy`] behind one circuit breaker.
///
/// Each dependency gets its own engine (and so its own breaker); the
/// metrics handle is usually shared across all of them.
pub struct RetryPolicyEngine {
    strategies: Arc<StrategySet>,
    breaker: CircuitBreaker,
    metrics: Arc<RetryMetrics>,
}

impl RetryPolicyEngine {
    pub fn new(
        name: impl Into<String>,
        strategies: Arc<StrategySet>,
        breaker: BreakerConfig,
        metrics: Arc<RetryMetrics>,
    ) -> Self {
        Self {
            breaker: CircuitBreaker::new(name, breaker, metrics.clone()),
            strategies,
            metrics,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_defaults(name: &str) -> Self {
        Self::new(
            name,
            Arc::new(StrategySet::default()),
            BreakerConfig::default(),
            Arc::new(RetryMetrics::default()),
        )
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    #[cfg(test)]
    pub(crate) fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Executes `operation` until it succeeds, fails non-retryably, or the
    /// strategy runs out of attempts or time.
    ///
    /// Non-retryable errors are returned unchanged. Exhaustion and budget
    /// overruns count as one breaker failure for the whole call.
    pub async fn execute<T, F, Fut>(&self, strategy_name: &str, mut operation: F) -> Result<T, DrillError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DrillError>>,
    {
        let strategy = self.strategies.get(strategy_name)?;

        if let Err(retry_in) = self.breaker.try_acquire() {
            warn!(
                breaker = %self.breaker.name(),
                strategy = %strategy.name,
                retry_in_ms = retry_in.as_millis() as u64,
                "circuit open, call rejected"
            );
            return Err(DrillError::CircuitOpen {
                component: self.breaker.name().to_string(),
                retry_in_ms: retry_in.as_millis() as u64,
            });
        }

        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let mut attempt_timeout = strategy.timeout_for_attempt(attempt);
            if let Some(budget) = strategy.total_time_budget {
                let remaining = budget.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    return Err(self.budget_spent(strategy, attempt - 1, budget));
                }
                attempt_timeout = attempt_timeout.min(remaining);
            }

            self.metrics.record_attempt();
            let outcome = match timeout(attempt_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(DrillError::AttemptTimeout {
                    after_ms: attempt_timeout.as_millis() as u64,
                }),
            };

            let err = match outcome {
                Ok(value) => {
                    self.metrics.record_success();
                    self.breaker.on_success();
                    if attempt > 1 {
                        debug!(strategy = %strategy.name, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };
            self.metrics.record_failure();

            let class = err.failure_class();
            if class == FailureClass::NonRetryable {
                self.breaker.release();
                debug!(strategy = %strategy.name, attempt, error = %err, "non-retryable failure");
                return Err(err);
            }

            if attempt >= strategy.max_attempts {
                self.breaker.on_failure();
                warn!(strategy = %strategy.name, attempts = attempt, error = %err, "retries exhausted");
                return Err(DrillError::ExhaustedRetries {
                    strategy: strategy.name.clone(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = strategy.backoff(attempt, err.retry_after());
            if let Some(budget) = strategy.total_time_budget
                && started.elapsed() + delay >= budget
            {
                return Err(self.budget_spent(strategy, attempt, budget));
            }

            warn!(
                strategy = %strategy.name,
                attempt,
                max_attempts = strategy.max_attempts,
                cold_start = class == FailureClass::ColdStart,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, backing off"
            );
            sleep(delay).await;
        }
    }

    fn budget_spent(&self, strategy: &RetryStrategy, attempts: u32, budget: Duration) -> DrillError {
        self.breaker.on_failure();
        warn!(strategy = %strategy.name, attempts, budget_ms = budget.as_millis() as u64, "time budget spent");
        DrillError::Timeout {
            strategy: strategy.name.clone(),
            attempts,
            budget_ms: budget.as_millis() as u64,
        }
    }
}
