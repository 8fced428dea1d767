//! Retry strategies, circuit breaking and the engine that combines them.
//!
//! Every outbound call (submission API, notifier, document store) goes
//! through a [`RetryPolicyEngine`]:
//!
//! ```text
//! execute("normal", op)
//!   ├─ breaker open, still cooling down  → CircuitOpen (op never runs)
//!   ├─ attempt races its timeout
//!   │    ├─ Ok                           → breaker.on_success(), return
//!   │    ├─ non-retryable error          → return it unchanged
//!   │    └─ transient / cold start       → backoff (+jitter), try again
//!   └─ attempts or budget spent          → breaker.on_failure(),
//!                                          ExhaustedRetries / Timeout
//! ```

pub mod breaker;
pub mod engine;
pub mod metrics;
pub mod strategy;

pub use breaker::{BreakerConfig, BreakerState};
pub use engine::RetryPolicyEngine;
pub use metrics::RetryMetrics;
pub use strategy::{StrategyOverride, StrategySet};
