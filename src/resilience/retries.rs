//! Retry logic.
//!
//! # Responsibilities
//! - Re-attempt a failed operation a bounded number of times
//! - Classify errors as retryable or fatal using configured markers
//! - Wait with exponential backoff between attempts
//! - Publish an event for every scheduled retry
//!
//! # Design Decisions
//! - At most `max_attempts` invocations of the operation
//! - An empty marker list means every error is retryable
//! - Backoff sleeps suspend only the calling task
//! - Observers subscribe to a broadcast channel instead of registering callbacks

use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::{apply_jitter, calculate_backoff};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Errors that can be classified against retry markers.
pub trait Retryable: std::fmt::Display {
    /// Stable machine-readable code (e.g. `TIMEOUT`, `HTTP_503`).
    fn code(&self) -> Cow<'_, str>;

    /// Whether `marker` names this error: equal to its code, or contained in its message.
    fn matches_marker(&self, marker: &str) -> bool {
        self.code() == marker || self.to_string().contains(marker)
    }
}

/// Why `execute` gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed; `last` is the final cause.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// The error did not match any retryable marker.
    #[error("{0}")]
    Aborted(E),
}

/// Emitted each time an attempt failed and another one is scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEvent {
    /// Label of the policy (the downstream service name).
    pub service: String,
    /// Attempt that just failed (1-based).
    pub attempt: u32,
    /// Display form of the failure.
    pub error: String,
    /// Delay before the next attempt.
    pub delay: Duration,
}

/// Bounded retry with exponential backoff.
#[derive(Debug)]
pub struct RetryPolicy {
    label: String,
    config: RetryConfig,
    events: broadcast::Sender<RetryEvent>,
}

impl RetryPolicy {
    /// Create a policy; `label` identifies it in logs and events.
    pub fn new(label: impl Into<String>, config: RetryConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            label: label.into(),
            config,
            events,
        }
    }

    /// The configured policy.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Subscribe to retry events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RetryEvent> {
        self.events.subscribe()
    }

    /// Delay after a failed `attempt` (1-based), before jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.config.initial_delay_ms,
            self.config.backoff_multiplier,
            self.config.max_delay_ms,
        )
    }

    /// Whether `error` may be retried under this policy.
    pub fn is_retryable<E: Retryable>(&self, error: &E) -> bool {
        self.config.retryable_errors.is_empty()
            || self
                .config
                .retryable_errors
                .iter()
                .any(|marker| error.matches_marker(marker))
    }

    /// Run `operation` until it succeeds, fails fatally, or attempts run out.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    service = %self.label,
                    attempts = attempt,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            if !self.is_retryable(&error) {
                tracing::debug!(
                    service = %self.label,
                    attempt,
                    code = %error.code(),
                    "Error is not retryable"
                );
                return Err(RetryError::Aborted(error));
            }

            let delay = apply_jitter(self.delay_for_attempt(attempt), self.config.jitter_ratio);
            tracing::warn!(
                service = %self.label,
                attempt,
                delay = ?delay,
                error = %error,
                "Retrying request"
            );
            metrics::record_retry(&self.label);
            // No subscribers is fine
            let _ = self.events.send(RetryEvent {
                service: self.label.clone(),
                attempt,
                error: error.to_string(),
                delay,
            });

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
