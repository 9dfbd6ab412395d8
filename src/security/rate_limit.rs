//! Fixed-window admission throttle.
//!
//! # Responsibilities
//! - Derive a rate-limit key per request (client IP or a named header)
//! - Count hits per key in the shared counter store
//! - Reject with 429 once a key exceeds its budget for the window
//! - Advertise limit, remaining budget and reset time on every response
//!
//! # Design Decisions
//! - A rejected request still counts toward its window
//! - Store failures admit the request without headers (fail-open)
//! - A counter found without a TTL gets the window re-applied
//! - Exempt paths skip the store entirely

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::{RateLimitConfig, RateLimitKey};
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::security::store::{CounterStore, StoreError};

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Budget of one key after a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u64,
    pub remaining: u64,
    /// Window end, Unix seconds.
    pub reset_at: u64,
    /// Seconds until the window ends, at least 1.
    pub retry_after: u64,
}

impl RateLimitStatus {
    /// Write the advisory headers onto a response.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset_at));
    }
}

/// Outcome of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted(RateLimitStatus),
    Rejected(RateLimitStatus),
    /// The store failed; the request goes through unmetered.
    FailedOpen,
}

/// Per-key fixed-window counter over a [`CounterStore`].
#[derive(Debug)]
pub struct AdmissionThrottle<S> {
    store: Arc<S>,
    enabled: bool,
    max_requests: u64,
    window: Duration,
    key_by: RateLimitKey,
    exempt_paths: HashSet<String>,
}

impl<S: CounterStore> AdmissionThrottle<S> {
    pub fn new(store: Arc<S>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            enabled: config.enabled,
            max_requests: config.max_requests,
            window: Duration::from_millis(config.window_ms),
            key_by: config.key_by.clone(),
            exempt_paths: config.exempt_paths.iter().cloned().collect(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Whether requests to `path` are throttled at all.
    pub fn applies_to(&self, path: &str) -> bool {
        self.enabled && !self.exempt_paths.contains(path)
    }

    /// Rate-limit key for a request; header keys fall back to the client IP.
    pub fn key_for(&self, headers: &HeaderMap, client: Option<SocketAddr>) -> String {
        if let RateLimitKey::Header { name } = &self.key_by {
            if let Some(value) = headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
            {
                return format!("header:{}:{}", name.to_ascii_lowercase(), value);
            }
        }
        match client {
            Some(addr) => format!("ip:{}", addr.ip()),
            None => "ip:unknown".to_string(),
        }
    }

    /// Count one hit for `key` and decide.
    pub async fn check(&self, key: &str) -> Admission {
        match self.try_check(key).await {
            Ok(admission) => admission,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Rate limit store unavailable, admitting request");
                Admission::FailedOpen
            }
        }
    }

    async fn try_check(&self, key: &str) -> Result<Admission, StoreError> {
        let store_key = format!("ratelimit:{key}");

        let count = self.store.incr(&store_key).await?;
        if count == 1 {
            self.store.expire(&store_key, self.window).await?;
        }
        let ttl = match self.store.ttl(&store_key).await? {
            Some(ttl) => ttl,
            None => {
                // An earlier expire was lost; without a TTL the key never resets.
                tracing::debug!(key = %store_key, "Rate limit counter had no expiry, re-applying window");
                self.store.expire(&store_key, self.window).await?;
                self.window
            }
        };

        let retry_after = ceil_secs(ttl).max(1);
        let status = RateLimitStatus {
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(count),
            reset_at: unix_now_secs() + retry_after,
            retry_after,
        };

        if count > self.max_requests {
            Ok(Admission::Rejected(status))
        } else {
            Ok(Admission::Admitted(status))
        }
    }
}

/// Middleware enforcing the throttle ahead of every other gateway layer.
pub async fn rate_limit_middleware<S: CounterStore>(
    State(throttle): State<Arc<AdmissionThrottle<S>>>,
    request: Request,
    next: Next,
) -> Response {
    if !throttle.applies_to(request.uri().path()) {
        return next.run(request).await;
    }

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = throttle.key_for(request.headers(), client);

    match throttle.check(&key).await {
        Admission::Admitted(status) => {
            let mut response = next.run(request).await;
            status.apply(response.headers_mut());
            response
        }
        Admission::Rejected(status) => {
            tracing::warn!(client = %key, limit = status.limit, "Rate limit exceeded");
            metrics::record_rate_limited("window_exceeded");
            let mut response = GatewayError::TooManyRequests.into_response();
            status.apply(response.headers_mut());
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(status.retry_after));
            response
        }
        Admission::FailedOpen => next.run(request).await,
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
