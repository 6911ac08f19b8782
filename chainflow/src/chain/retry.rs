//! Retry with configurable backoff and jitter.
//!
//! [`retry`] wraps a link so that an `Err` re-runs it against a fresh clone of
//! the same input context, up to `max_attempts` runs in total. Errors recorded
//! into the context (validation failures) are not retried: the link
//! succeeded, it just reported a problem.

use crate::context::Context;
use crate::links::{Link, LinkRef, LinkResult};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Jitter strategy applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of runs, including the first one.
    pub max_attempts: usize,
    /// Base delay between runs in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }
}

/// State tracking for one retried operation.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Number of retries scheduled so far.
    pub attempt: usize,
    previous_delays: HashMap<String, u64>,
}

impl RetryState {
    /// Creates a new retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once no further run is allowed after the current one.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempt + 1 >= config.max_attempts
    }

    /// Calculates the delay before the next run.
    #[must_use]
    pub fn calculate_delay(&mut self, key: &str, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let attempt = u32::try_from(self.attempt).unwrap_or(u32::MAX);

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(attempt)).min(max),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt) + 1).min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_delays.get(key).copied().unwrap_or(base);
                let upper = prev.saturating_mul(3).min(max);
                let next = if upper <= base {
                    base.min(max)
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                };
                self.previous_delays.insert(key.to_string(), next);
                next
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run again after the delay.
    Retry(Duration),
    /// Attempts exhausted.
    GiveUp,
    /// The error is not retryable.
    NotRetryable,
}

/// Decides what to do after a failed run.
#[must_use]
pub fn should_retry(state: &mut RetryState, config: &RetryConfig, key: &str) -> RetryDecision {
    if state.is_exhausted(config) {
        return RetryDecision::GiveUp;
    }

    let delay = state.calculate_delay(key, config);
    state.attempt += 1;
    RetryDecision::Retry(delay)
}

/// Runs `operation` until it succeeds or the attempts are exhausted.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, key: &str, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    with_retry_if(config, key, operation, |_| true).await
}

/// Like [`with_retry`], but only errors accepted by `retryable` are retried.
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    key: &str,
    mut operation: F,
    retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut state = RetryState::new();

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let decision = if retryable(&error) {
                    should_retry(&mut state, config, key)
                } else {
                    RetryDecision::NotRetryable
                };
                match decision {
                    RetryDecision::Retry(delay) => {
                        tracing::debug!(
                            key,
                            attempt = state.attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %error,
                            "retrying after error"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::GiveUp | RetryDecision::NotRetryable => {
                        tracing::debug!(key, attempts = state.attempt + 1, ?decision, "giving up");
                        return Err(error);
                    }
                }
            }
        }
    }
}

type RetryPredicate = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// A link that re-runs its inner link on failure.
pub struct RetryLink {
    inner: LinkRef,
    config: RetryConfig,
    retry_if: Option<RetryPredicate>,
}

impl RetryLink {
    /// Wraps `inner` with `config`.
    #[must_use]
    pub fn new(inner: LinkRef, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            retry_if: None,
        }
    }

    /// Only retries errors for which `predicate` returns true.
    #[must_use]
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Returns the retry configuration.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl Link for RetryLink {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, ctx: Context) -> LinkResult {
        let inner = &self.inner;
        let predicate = self.retry_if.as_deref();
        with_retry_if(
            &self.config,
            inner.name(),
            move || inner.run(ctx.clone()),
            |error| predicate.map_or(true, |accept| accept(error)),
        )
        .await
    }
}

/// Shorthand for `Arc::new(RetryLink::new(link, config))`.
#[must_use]
pub fn retry(link: LinkRef, config: RetryConfig) -> LinkRef {
    Arc::new(RetryLink::new(link, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FailingLink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(attempts: usize) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(attempts)
            .with_base_delay_ms(1)
            .with_jitter(JitterStrategy::None)
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30000);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Exponential);
        assert_eq!(config.jitter_strategy, JitterStrategy::Full);
    }

    #[test]
    fn test_retry_config_serde() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_attempts": 5, "backoff_strategy": "linear"}"#).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(config.base_delay_ms, 1000);
    }

    #[test]
    fn test_calculate_delay_strategies() {
        let mut state = RetryState::new();
        let exponential = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::None);
        let linear = exponential.clone().with_backoff(BackoffStrategy::Linear);
        let constant = exponential.clone().with_backoff(BackoffStrategy::Constant);

        state.attempt = 2;
        assert_eq!(state.calculate_delay("k", &exponential), Duration::from_millis(400));
        assert_eq!(state.calculate_delay("k", &linear), Duration::from_millis(300));
        assert_eq!(state.calculate_delay("k", &constant), Duration::from_millis(100));
    }

    #[test]
    fn test_calculate_delay_capped_at_max() {
        let config = RetryConfig::new()
            .with_base_delay_ms(1000)
            .with_max_delay_ms(5000)
            .with_jitter(JitterStrategy::None);
        let mut state = RetryState::new();
        state.attempt = 10;
        assert_eq!(state.calculate_delay("k", &config), Duration::from_millis(5000));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let full = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Constant);
        let equal = full.clone().with_jitter(JitterStrategy::Equal);
        let decorrelated = full.clone().with_jitter(JitterStrategy::Decorrelated).with_max_delay_ms(250);
        let mut state = RetryState::new();

        for _ in 0..20 {
            assert!(state.calculate_delay("k", &full) <= Duration::from_millis(100));
            let d = state.calculate_delay("k", &equal);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(100));
            let d = state.calculate_delay("k", &decorrelated);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_should_retry_counts_total_attempts() {
        let config = fast(3);
        let mut state = RetryState::new();

        assert!(matches!(should_retry(&mut state, &config, "k"), RetryDecision::Retry(_)));
        assert!(matches!(should_retry(&mut state, &config, "k"), RetryDecision::Retry(_)));
        assert_eq!(should_retry(&mut state, &config, "k"), RetryDecision::GiveUp);
    }

    #[tokio::test]
    async fn test_with_retry_success_after_failures() {
        let mut calls = 0;
        let result: Result<i32, String> = with_retry(&fast(5), "op", || {
            calls += 1;
            let current = calls;
            async move {
                if current < 3 {
                    Err(format!("attempt {current}"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = with_retry(&fast(3), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("always".to_string()) }
        })
        .await;

        assert_eq!(result, Err("always".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_if_stops_on_fatal() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), &str> = with_retry_if(
            &fast(5),
            "op",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            },
            |error| *error != "fatal",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_link_recovers() {
        let flaky = Arc::new(FailingLink::new("flaky", 2));
        let link = retry(flaky.clone(), fast(3));

        let out = link.run(Context::new().with("n", 1)).await.unwrap();

        assert_eq!(link.name(), "flaky");
        assert_eq!(flaky.calls(), 3);
        assert_eq!(out.get_i64("n"), Some(1));
    }

    #[tokio::test]
    async fn test_retry_link_gives_up() {
        let flaky = Arc::new(FailingLink::new("flaky", 10));
        let link = retry(flaky.clone(), fast(2));

        let err = link.run(Context::new()).await.unwrap_err();
        assert!(err.to_string().contains("flaky"));
        assert_eq!(flaky.calls(), 2);
    }

    #[tokio::test]
    async fn test_retry_link_predicate() {
        let flaky = Arc::new(FailingLink::new("flaky", 10));
        let link = RetryLink::new(flaky.clone(), fast(5)).retry_if(|_| false);

        assert!(link.run(Context::new()).await.is_err());
        assert_eq!(flaky.calls(), 1);
    }
}
