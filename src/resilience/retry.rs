//! Retry with capped exponential backoff.
//!
//! The delay before retry `n` is `initial_delay * backoff_factor^(n-1)`, capped
//! at `max_delay`. When `max_delay < initial_delay` every delay is clamped to
//! `max_delay`. The last failure is returned unchanged so callers can still
//! classify it.

use crate::classify::{is_retryable, Classify};
use crate::utils::millis;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Largest `max_retries` a validated config accepts.
pub const MAX_RETRIES_LIMIT: u32 = 100;

/// Configuration for retry logic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    #[serde(rename = "initial_delay_ms", with = "crate::utils::serde_millis")]
    pub initial_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "crate::utils::serde_millis")]
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Rejects backoff factors that are not finite or shrink the delay, and
    /// retry budgets above [`MAX_RETRIES_LIMIT`].
    pub fn validate(&self) -> Result<()> {
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(Error::configuration_with_context(
                format!(
                    "max_retries must be at most {}, got {}",
                    MAX_RETRIES_LIMIT, self.max_retries
                ),
                ErrorContext::new()
                    .with_field_path("retry.max_retries")
                    .with_source("retry_config"),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(Error::configuration_with_context(
                format!(
                    "backoff factor must be a finite number >= 1.0, got {}",
                    self.backoff_factor
                ),
                ErrorContext::new()
                    .with_field_path("retry.backoff_factor")
                    .with_source("retry_config"),
            ));
        }
        Ok(())
    }

    /// Delay before the first retry.
    pub fn first_delay(&self) -> Duration {
        self.initial_delay.min(self.max_delay)
    }

    /// Delay following `current`, capped at `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ns = current.as_nanos() as f64 * self.backoff_factor;
        if !next_ns.is_finite() || next_ns >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(next_ns.round() as u64)
    }

    /// All delays a fully failing operation would wait through.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut delays = Vec::with_capacity(self.max_retries.min(MAX_RETRIES_LIMIT) as usize);
        let mut delay = self.first_delay();
        for _ in 0..self.max_retries {
            delays.push(delay);
            delay = self.next_delay(delay);
        }
        delays
    }
}

type ShouldRetryFn<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
type OnRetryFn<E> = Arc<dyn Fn(u32, &E) + Send + Sync>;

/// A retry policy bound to an error type.
pub struct Retry<E> {
    config: RetryConfig,
    should_retry: ShouldRetryFn<E>,
    on_retry: Option<OnRetryFn<E>>,
}

impl<E> Clone for Retry<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            should_retry: Arc::clone(&self.should_retry),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E: Classify + 'static> Retry<E> {
    /// Retries failures whose classified kind is recoverable.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_predicate(config, |err: &E| is_retryable(err))
    }
}

impl<E> Retry<E> {
    pub fn with_predicate<P>(config: RetryConfig, should_retry: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            config,
            should_retry: Arc::new(should_retry),
            on_retry: None,
        }
    }

    pub fn should_retry<P>(mut self, should_retry: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(should_retry);
        self
    }

    /// Called with the 1-based retry number before each backoff sleep.
    pub fn on_retry<C>(mut self, on_retry: C) -> Self
    where
        C: Fn(u32, &E) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(on_retry));
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds, the retry budget is spent, or the
    /// failure is not retryable. At most `max_retries + 1` attempts are made.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        let mut delay = self.config.first_delay();
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if attempt >= self.config.max_retries || !(self.should_retry)(&err) {
                return Err(err);
            }
            attempt += 1;
            if let Some(ref on_retry) = self.on_retry {
                on_retry(attempt, &err);
            }
            info!(
                attempt,
                max_retries = self.config.max_retries,
                delay_ms = millis(delay),
                "retrying failed operation"
            );
            tokio::time::sleep(delay).await;
            delay = self.config.next_delay(delay);
        }
    }
}

/// Retries `operation` with the default classification-based predicate.
pub async fn retry<T, E, F, Fut>(operation: F, config: RetryConfig) -> std::result::Result<T, E>
where
    E: Classify + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    Retry::new(config).run(operation).await
}
