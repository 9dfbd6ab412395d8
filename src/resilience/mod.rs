//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to downstream:
//!     → retries.rs (bounded attempts, backoff.rs computes the delays)
//!         → circuit_breaker.rs (fail fast while open, track outcomes)
//!             → timeouts.rs (enforce the per-attempt deadline)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every downstream attempt has a deadline
//! - Circuit breaker prevents cascading failures
//! - Retries see an open circuit as one more failure and fail fast through it
//! - Policies are per downstream, built once at startup

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerPermit, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use retries::{RetryError, RetryEvent, RetryPolicy, Retryable};
