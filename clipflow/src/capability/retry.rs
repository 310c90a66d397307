//! Retry with backoff for transient generation failures.
//!
//! The executor never retries a stage. Callers that want transient
//! `Unavailable` errors retried wrap their capability in
//! [`RetryingCapability`].

use super::GenerationCapability;
use crate::context::StageInputs;
use crate::errors::CapabilityError;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
}

/// How often and how patiently to retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::Full,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Returns the delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            BackoffStrategy::Exponential => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt.saturating_add(1)),
            BackoffStrategy::Constant => self.base_delay,
        }
        .min(self.max_delay);

        match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay.is_zero() {
                    delay
                } else {
                    rand::thread_rng().gen_range(Duration::ZERO..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half.is_zero() {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(Duration::ZERO..=half)
                }
            }
        }
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are used up.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, CapabilityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                attempt += 1;
                debug!(
                    label = %label,
                    attempt,
                    delay_ms = crate::utils::duration_ms(delay),
                    error = %e,
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(label = %label, attempts = attempt + 1, error = %e, "Retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

/// A generation capability that retries transient failures of another one.
pub struct RetryingCapability<C> {
    inner: C,
    policy: RetryPolicy,
    label: String,
}

impl<C: GenerationCapability> RetryingCapability<C> {
    /// Wraps `inner` with `policy`.
    #[must_use]
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            label: "capability".to_string(),
        }
    }

    /// Sets the label used in retry logs.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

#[async_trait]
impl<C: GenerationCapability> GenerationCapability for RetryingCapability<C> {
    async fn invoke(&self, inputs: &StageInputs) -> Result<serde_json::Value, CapabilityError> {
        with_retry(&self.policy, &self.label, || self.inner.invoke(inputs)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::MockGenerationCapability;
    use serde_json::json;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy::new()
            .with_base_delay(Duration::from_millis(100))
            .with_jitter(JitterStrategy::None)
    }

    #[test]
    fn test_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff, BackoffStrategy::Exponential);
        assert_eq!(policy.jitter, JitterStrategy::Full);
    }

    #[test]
    fn test_exponential_delays() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn test_linear_and_constant_delays() {
        let linear = no_jitter().with_backoff(BackoffStrategy::Linear);
        assert_eq!(linear.delay_for(2), Duration::from_millis(300));

        let constant = no_jitter().with_backoff(BackoffStrategy::Constant);
        assert_eq!(constant.delay_for(5), Duration::from_millis(100));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = no_jitter()
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5));
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_bounds() {
        let full = no_jitter().with_jitter(JitterStrategy::Full);
        let equal = no_jitter().with_jitter(JitterStrategy::Equal);
        for _ in 0..100 {
            assert!(full.delay_for(0) <= Duration::from_millis(100));
            let d = equal.delay_for(0);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors() {
        let mut mock = MockGenerationCapability::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_invoke()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(CapabilityError::Unavailable("503".into())));
        mock.expect_invoke()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(json!("narration")));

        let capability = RetryingCapability::new(mock, no_jitter()).with_label("tts");
        let value = capability.invoke(&StageInputs::default()).await.unwrap();
        assert_eq!(value, json!("narration"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let mut mock = MockGenerationCapability::new();
        mock.expect_invoke()
            .times(3)
            .returning(|_| Err(CapabilityError::Unavailable("503".into())));

        let capability = RetryingCapability::new(mock, no_jitter());
        let err = capability.invoke(&StageInputs::default()).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_does_not_retry_rejections() {
        let mut mock = MockGenerationCapability::new();
        mock.expect_invoke()
            .times(1)
            .returning(|_| Err(CapabilityError::Rejected("bad prompt".into())));

        let capability = RetryingCapability::new(mock, no_jitter());
        let err = capability.invoke(&StageInputs::default()).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Rejected(_)));
    }
}
