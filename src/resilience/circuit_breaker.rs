//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: downstream assumed down, requests fail fast
//! - Half-Open: testing if downstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures reach failure_threshold
//! Open → Half-Open: first permission check after reset_timeout elapsed
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails
//! ```
//!
//! # Design Decisions
//! - Per-downstream circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Open → Half-Open is evaluated lazily on `can_execute`, no timer task
//! - Single trial call in Half-Open
//! - A trial call abandoned before it reports counts as a failed one
//! - State is replica-local; replicas do not share failure history

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Stable lowercase label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a breaker for the operational surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Milliseconds since the circuit last opened, while Open.
    pub open_for_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptKind {
    Closed,
    Trial,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Failure-tracking state machine guarding one downstream.
///
/// Callers check [`can_execute`](Self::can_execute) before each attempt and
/// report exactly one of [`record_success`](Self::record_success) or
/// [`record_failure`](Self::record_failure) for every permitted attempt.
/// Callers whose attempt may be cancelled use [`begin`](Self::begin) instead,
/// which ties the outcome to a [`BreakerPermit`].
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker for the named downstream.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        metrics::record_breaker_state(&name, CircuitState::Closed);
        Self {
            name,
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Name of the downstream this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether an attempt may be made right now.
    ///
    /// The only side effect is the lazy Open → Half-Open transition, which
    /// also claims the single trial slot for the caller.
    pub fn can_execute(&self) -> bool {
        self.admit().is_some()
    }

    /// Admit one attempt and hand back the permit that reports its outcome.
    ///
    /// Returns `None` while the circuit rejects calls. Dropping the permit of
    /// a half-open trial call without settling it reopens the circuit.
    pub fn begin(&self) -> Option<BreakerPermit<'_>> {
        self.admit().map(|kind| BreakerPermit {
            breaker: self,
            kind,
            settled: false,
        })
    }

    fn admit(&self) -> Option<AttemptKind> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(AttemptKind::Closed),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|opened_at| opened_at.elapsed())
                    .unwrap_or(self.reset_timeout);
                if elapsed >= self.reset_timeout {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.trial_in_flight = true;
                    Some(AttemptKind::Trial)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(AttemptKind::Trial)
                }
            }
        }
    }

    /// Report a successful attempt.
    pub fn record_success(&self) {
        self.on_success(None);
    }

    /// Report a failed attempt.
    pub fn record_failure(&self) {
        self.on_failure(None);
    }

    fn on_success(&self, kind: Option<AttemptKind>) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            // Only the trial call decides a half-open circuit.
            CircuitState::HalfOpen if kind == Some(AttemptKind::Closed) => {}
            CircuitState::HalfOpen => {
                inner.consecutive_failures = 0;
                inner.trial_in_flight = false;
                inner.opened_at = None;
                self.transition(&mut inner, CircuitState::Closed);
            }
            // A straggler permitted before the circuit opened; the trial call decides.
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, kind: Option<AttemptKind>) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.opened_at = Some(Instant::now());
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if kind == Some(AttemptKind::Closed) => {}
            CircuitState::HalfOpen => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                inner.trial_in_flight = false;
                inner.opened_at = Some(Instant::now());
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Current state, without evaluating the reset timeout.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Current consecutive failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Snapshot for reporting.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            open_for_ms: match inner.state {
                CircuitState::Open => inner
                    .opened_at
                    .map(|opened_at| opened_at.elapsed().as_millis() as u64),
                _ => None,
            },
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        match to {
            CircuitState::Open => tracing::warn!(
                service = %self.name,
                from = %from,
                consecutive_failures = inner.consecutive_failures,
                reset_timeout_ms = self.reset_timeout.as_millis() as u64,
                "Circuit opened"
            ),
            _ => tracing::info!(service = %self.name, from = %from, to = %to, "Circuit state changed"),
        }
        metrics::record_breaker_state(&self.name, to);
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One admitted attempt, settled with [`success`](Self::success) or
/// [`failure`](Self::failure).
///
/// An unsettled trial permit counts as a failure when dropped. An unsettled
/// closed-state permit leaves the failure count alone.
#[derive(Debug)]
#[must_use = "an unsettled trial permit reopens the circuit when dropped"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    kind: AttemptKind,
    settled: bool,
}

impl BreakerPermit<'_> {
    /// Whether this permit holds the half-open trial slot.
    pub fn is_trial(&self) -> bool {
        self.kind == AttemptKind::Trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(Some(self.kind));
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(Some(self.kind));
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.settled || self.kind == AttemptKind::Closed {
            return;
        }
        tracing::warn!(service = %self.breaker.name, "Trial call abandoned before completing");
        self.breaker.on_failure(Some(self.kind));
    }
}
