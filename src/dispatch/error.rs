//! Dispatch error types.

use std::borrow::Cow;

use axum::body::Bytes;
use axum::http::StatusCode;
use thiserror::Error;

use crate::resilience::Retryable;

/// A failed attempt against a downstream service.
#[derive(Debug, Clone, Error)]
pub enum DownstreamError {
    /// TCP connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The attempt exceeded the service's request timeout.
    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The downstream answered with a non-success status.
    #[error("downstream responded with {status}")]
    Status { status: StatusCode, body: Bytes },

    /// Any other transport-level failure (reset, protocol error, body read).
    #[error("transport error: {0}")]
    Transport(String),

    /// The outgoing request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DownstreamError {
    /// Downstream status code, if the failure was a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DownstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl Retryable for DownstreamError {
    fn code(&self) -> Cow<'_, str> {
        match self {
            DownstreamError::Connect(_) => Cow::Borrowed("CONNECT"),
            DownstreamError::Timeout { .. } => Cow::Borrowed("TIMEOUT"),
            DownstreamError::Status { status, .. } => Cow::Owned(format!("HTTP_{}", status.as_u16())),
            DownstreamError::Transport(_) => Cow::Borrowed("TRANSPORT"),
            DownstreamError::InvalidRequest(_) => Cow::Borrowed("INVALID_REQUEST"),
        }
    }
}

/// Errors surfaced to callers of the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No downstream is registered under this name.
    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// The service's breaker rejected the call without contacting it.
    #[error("circuit open for service '{service}'")]
    CircuitOpen { service: String },

    /// The retry policy ran out of attempts.
    #[error("service '{service}' failed after {attempts} attempts: {cause}")]
    RetryExhausted {
        service: String,
        attempts: u32,
        #[source]
        cause: Box<DispatchError>,
    },

    /// The raw downstream failure.
    #[error(transparent)]
    Downstream(#[from] DownstreamError),
}

impl DispatchError {
    /// The innermost cause, unwrapping retry exhaustion.
    pub fn root_cause(&self) -> &DispatchError {
        match self {
            DispatchError::RetryExhausted { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl Retryable for DispatchError {
    fn code(&self) -> Cow<'_, str> {
        match self {
            DispatchError::UnknownService(_) => Cow::Borrowed("UNKNOWN_SERVICE"),
            DispatchError::CircuitOpen { .. } => Cow::Borrowed("CIRCUIT_OPEN"),
            DispatchError::RetryExhausted { .. } => Cow::Borrowed("RETRY_EXHAUSTED"),
            DispatchError::Downstream(e) => e.code(),
        }
    }
}
