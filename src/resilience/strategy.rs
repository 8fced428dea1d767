use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::DrillError;

pub const FAST: &str = "fast";
pub const NORMAL: &str = "normal";
pub const COLD_START: &str = "cold_start";

/// Immutable retry policy chosen per call site.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryStrategy {
    pub name: String,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    /// Delay is scaled by a random factor in `[1 - f, 1 + f]`.
    pub jitter_fraction: f64,
    pub base_timeout: Duration,
    pub timeout_multiplier: f64,
    pub total_time_budget: Option<Duration>,
}

impl RetryStrategy {
    /// Quick health checks: give up early, the caller decides what next.
    pub fn fast() -> Self {
        Self {
            name: FAST.to_string(),
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
            jitter_fraction: 0.25,
            base_timeout: Duration::from_secs(5),
            timeout_multiplier: 1.0,
            total_time_budget: Some(Duration::from_secs(15)),
        }
    }

    pub fn normal() -> Self {
        Self {
            name: NORMAL.to_string(),
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(15),
            backoff_multiplier: 2.0,
            jitter: true,
            jitter_fraction: 0.25,
            base_timeout: Duration::from_secs(15),
            timeout_multiplier: 1.5,
            total_time_budget: Some(Duration::from_secs(90)),
        }
    }

    /// Patient wake-up probing for hosts that sleep when idle.
    pub fn cold_start() -> Self {
        Self {
            name: COLD_START.to_string(),
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
            jitter_fraction: 0.25,
            base_timeout: Duration::from_secs(30),
            timeout_multiplier: 1.5,
            total_time_budget: Some(Duration::from_secs(300)),
        }
    }

    /// Per-attempt timeout: `base_timeout * timeout_multiplier^(attempt-1)`, capped at `max_delay`.
    pub fn timeout_for_attempt(&self, attempt: u32) -> Duration {
        scale(self.base_timeout, self.timeout_multiplier, attempt).min(self.max_delay)
    }

    /// Backoff before the next attempt: `base_delay * backoff_multiplier^(attempt-1)`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        scale(self.base_delay, self.backoff_multiplier, attempt).min(self.max_delay)
    }

    /// Backoff with jitter applied and a server-requested floor honoured.
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let mut delay = self.delay_for_attempt(attempt);
        if self.jitter && self.jitter_fraction > 0.0 {
            let fraction = self.jitter_fraction.min(1.0);
            let factor = rand::thread_rng().gen_range(1.0 - fraction..=1.0 + fraction);
            delay = delay.mul_f64(factor);
        }
        if let Some(floor) = retry_after {
            delay = delay.max(floor);
        }
        delay.min(self.max_delay)
    }
}

fn scale(base: Duration, multiplier: f64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32) as i32;
    let factor = multiplier.max(1.0).powi(exponent);
    Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Partial strategy from `[retry.<name>]` in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyOverride {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub jitter: Option<bool>,
    pub jitter_fraction: Option<f64>,
    pub base_timeout_ms: Option<u64>,
    pub timeout_multiplier: Option<f64>,
    /// `0` disables the budget.
    pub total_time_budget_ms: Option<u64>,
}

impl StrategyOverride {
    fn apply(&self, mut strategy: RetryStrategy) -> RetryStrategy {
        if let Some(v) = self.max_attempts {
            strategy.max_attempts = v;
        }
        if let Some(v) = self.base_delay_ms {
            strategy.base_delay = Duration::from_millis(v);
        }
        if let Some(v) = self.max_delay_ms {
            strategy.max_delay = Duration::from_millis(v);
        }
        if let Some(v) = self.backoff_multiplier {
            strategy.backoff_multiplier = v;
        }
        if let Some(v) = self.jitter {
            strategy.jitter = v;
        }
        if let Some(v) = self.jitter_fraction {
            strategy.jitter_fraction = v;
        }
        if let Some(v) = self.base_timeout_ms {
            strategy.base_timeout = Duration::from_millis(v);
        }
        if let Some(v) = self.timeout_multiplier {
            strategy.timeout_multiplier = v;
        }
        if let Some(v) = self.total_time_budget_ms {
            strategy.total_time_budget = (v > 0).then(|| Duration::from_millis(v));
        }
        strategy
    }
}

/// Named strategies available to an engine.
#[derive(Debug, Clone)]
pub struct StrategySet {
    strategies: HashMap<String, RetryStrategy>,
}

impl Default for StrategySet {
    fn default() -> Self {
        let mut strategies = HashMap::new();
        for strategy in [
            RetryStrategy::fast(),
            RetryStrategy::normal(),
            RetryStrategy::cold_start(),
        ] {
            strategies.insert(strategy.name.clone(), strategy);
        }
        Self { strategies }
    }
}

impl StrategySet {
    /// Built-ins with config overrides layered on top. Unknown names start from `normal`.
    pub fn with_overrides(overrides: &HashMap<String, StrategyOverride>) -> Result<Self, DrillError> {
        let mut set = Self::default();
        for (name, patch) in overrides {
            let base = set.strategies.get(name).cloned().unwrap_or_else(|| RetryStrategy {
                name: name.clone(),
                ..RetryStrategy::normal()
            });
            set.insert(patch.apply(base))?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, strategy: RetryStrategy) -> Result<(), DrillError> {
        if strategy.max_attempts == 0 {
            return Err(DrillError::Config(format!(
                "retry strategy {} needs at least one attempt",
                strategy.name
            )));
        }
        if !(0.0..=1.0).contains(&strategy.jitter_fraction) {
            return Err(DrillError::Config(format!(
                "retry strategy {}: jitter_fraction must be within [0, 1]",
                strategy.name
            )));
        }
        self.strategies.insert(strategy.name.clone(), strategy);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&RetryStrategy, DrillError> {
        self.strategies
            .get(name)
            .ok_or_else(|| DrillError::UnknownStrategy(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryStrategy {
        RetryStrategy {
            jitter: false,
            ..RetryStrategy::normal()
        }
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let s = RetryStrategy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            ..no_jitter()
        };
        assert_eq!(s.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(s.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(s.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(s.delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(s.delay_for_attempt(40), Duration::from_millis(5000));
    }

    #[test]
    fn attempt_timeout_grows_then_caps() {
        let s = RetryStrategy::cold_start();
        assert_eq!(s.timeout_for_attempt(1), Duration::from_secs(30));
        assert_eq!(s.timeout_for_attempt(2), Duration::from_secs(45));
        assert_eq!(s.timeout_for_attempt(3), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_fraction() {
        let s = RetryStrategy {
            base_delay: Duration::from_millis(1000),
            jitter: true,
            jitter_fraction: 0.25,
            ..RetryStrategy::normal()
        };
        for _ in 0..200 {
            let d = s.backoff(1, None);
            assert!(d >= Duration::from_millis(750) && d <= Duration::from_millis(1250), "{d:?}");
        }
    }

    #[test]
    fn retry_after_raises_the_floor_but_not_the_cap() {
        let s = no_jitter();
        assert_eq!(s.backoff(1, Some(Duration::from_secs(4))), Duration::from_secs(4));
        assert_eq!(s.backoff(1, Some(Duration::from_secs(600))), s.max_delay);
    }

    #[test]
    fn overrides_patch_builtins_and_add_new_names() {
        let mut overrides = HashMap::new();
        overrides.insert(
            NORMAL.to_string(),
            StrategyOverride {
                max_attempts: Some(6),
                total_time_budget_ms: Some(0),
                ..Default::default()
            },
        );
        overrides.insert(
            "notify".to_string(),
            StrategyOverride {
                max_attempts: Some(2),
                ..Default::default()
            },
        );
        let set = StrategySet::with_overrides(&overrides).unwrap();
        let normal = set.get(NORMAL).unwrap();
        assert_eq!(normal.max_attempts, 6);
        assert_eq!(normal.total_time_budget, None);
        let notify = set.get("notify").unwrap();
        assert_eq!(notify.max_attempts, 2);
        assert_eq!(notify.base_delay, RetryStrategy::normal().base_delay);
        assert!(matches!(set.get("nope"), Err(DrillError::UnknownStrategy(_))));
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut overrides = HashMap::new();
        overrides.insert(
            FAST.to_string(),
            StrategyOverride {
                max_attempts: Some(0),
                ..Default::default()
            },
        );
        assert!(matches!(
            StrategySet::with_overrides(&overrides),
            Err(DrillError::Config(_))
        ));
    }
}
