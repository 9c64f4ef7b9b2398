//! Error types and retry handling
//!
//! This module contains the engine-level error taxonomy and the retry/backoff
//! primitive used for linkage actions.

use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::actuation::ActuationError;
use super::audit::AuditError;
use crate::rules::CatalogError;
use crate::store::StoreError;
use crate::types::{AreaId, ConfigValidationError, EngineConfig, RuleId};

/// Errors surfaced by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Event or request metadata is missing or unknown
    #[error("Validation failed: {0}")]
    Validation(String),

    /// State store failure
    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    /// Device command failure
    #[error("Actuation error: {0}")]
    Actuation(#[from] ActuationError),

    /// Rule catalog failure
    #[error("Rule catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Audit recorder failure
    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    /// Rule id not present in the catalog
    #[error("Rule not found: {0}")]
    RuleNotFound(RuleId),

    /// Area is not a side of the rule
    #[error("Area {area} is not part of interlock rule {rule}")]
    AreaNotInRule {
        /// Rule that was addressed
        rule: RuleId,
        /// Area that was supplied
        area: AreaId,
    },

    /// Background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    /// Engine no longer accepts work
    #[error("Engine is shutting down")]
    ShuttingDown,

    /// Configuration rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigValidationError),
}

impl EngineError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a task failure error
    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }

    /// Whether repeating the operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Store(e) => e.is_retryable(),
            EngineError::Actuation(e) => e.is_retryable(),
            EngineError::Catalog(CatalogError::Unavailable(_)) => true,
            EngineError::Audit(_) => true,
            _ => false,
        }
    }

    /// Get the error category
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "Validation",
            EngineError::Store(_) => "State Store",
            EngineError::Actuation(_) => "Actuation",
            EngineError::Catalog(_) => "Rule Catalog",
            EngineError::Audit(_) => "Audit",
            EngineError::RuleNotFound(_) | EngineError::AreaNotInRule { .. } => "Rule Lookup",
            EngineError::TaskFailed(_) | EngineError::ShuttingDown => "Worker Pool",
            EngineError::Config(_) => "Configuration",
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that know whether a retry may help
pub trait Retryable {
    /// Whether repeating the operation may succeed
    fn is_retryable(&self) -> bool;
}

impl Retryable for EngineError {
    fn is_retryable(&self) -> bool {
        EngineError::is_retryable(self)
    }
}

impl Retryable for ActuationError {
    fn is_retryable(&self) -> bool {
        ActuationError::is_retryable(self)
    }
}

/// Exponential backoff with random jitter
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Extra random delay as a fraction of the computed delay (0.0-1.0)
    pub jitter: f64,
}

/// Result of an operation run under a [`RetryPolicy`]
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final result
    pub result: Result<T, E>,
    /// Attempts made, including the first
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Retry up to `max_retries` times starting at `base_delay`
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: base_delay.saturating_mul(32),
            jitter: 0.2,
        }
    }

    /// Linkage retry policy from engine configuration
    pub fn for_linkage(config: &EngineConfig) -> Self {
        if config.linkage_max_retries == 0 {
            Self::none()
        } else {
            Self::new(config.linkage_max_retries, config.linkage_retry_backoff())
        }
    }

    /// Set the jitter fraction
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Set the maximum single delay
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if self.jitter > 0.0 && !delay.is_zero() {
            let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
            delay.mul_f64(1.0 + extra)
        } else {
            delay
        }
    }

    /// Run `operation` until it succeeds, fails permanently or retries run out
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn execute<T, E, F, Fut>(&self, label: &str, mut operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(err) if err.is_retryable() && attempt <= self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {} of {}): {}; retrying in {:?}",
                        label,
                        attempt,
                        self.max_retries + 1,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if self.max_retries > 0 {
                        error!("{} gave up after {} attempt(s): {}", label, attempt, err);
                    }
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceId;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unreachable() -> ActuationError {
        ActuationError::Unreachable {
            device: DeviceId(1),
            message: "link down".to_string(),
        }
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(EngineError::validation("x").category(), "Validation");
        assert_eq!(EngineError::RuleNotFound(RuleId(1)).category(), "Rule Lookup");
        assert_eq!(EngineError::ShuttingDown.category(), "Worker Pool");
        assert_eq!(EngineError::from(unreachable()).category(), "Actuation");
    }

    #[test]
    fn test_error_retryability() {
        assert!(EngineError::from(unreachable()).is_retryable());
        assert!(EngineError::from(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!EngineError::validation("unknown device").is_retryable());
        assert!(!EngineError::RuleNotFound(RuleId(3)).is_retryable());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100))
            .with_jitter(0.0)
            .with_max_delay(Duration::from_millis(300));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
        assert_eq!(policy.delay_for(10), Duration::from_millis(300));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100)).with_jitter(0.5);
        for _ in 0..50 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_linkage_policy_from_config() {
        assert_eq!(RetryPolicy::for_linkage(&EngineConfig::default()), RetryPolicy::none());

        let config = EngineConfig {
            linkage_max_retries: 2,
            ..Default::default()
        };
        let policy = RetryPolicy::for_linkage(&config);
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(10));

        let outcome = policy
            .execute("flaky op", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(unreachable())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 2);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_stops_on_permanent_error() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let outcome: RetryOutcome<(), ActuationError> = policy
            .execute("rejected op", |_| async {
                Err(ActuationError::Rejected {
                    device: DeviceId(1),
                    message: "door held open".to_string(),
                })
            })
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_exhausts_retries() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let outcome: RetryOutcome<(), ActuationError> =
            policy.execute("dead op", |_| async { Err(unreachable()) }).await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 3);
    }
}
