//! Multiplexed downstream client.
//!
//! # Responsibilities
//! - Own one connection profile (base URL, timeout, breaker, retry) per service
//! - Wrap every attempt in the service's circuit breaker and deadline
//! - Wrap the protected attempt in the service's retry policy, if any
//! - Report per-service outcomes to metrics
//!
//! # Design Decisions
//! - One pooled HTTP client shared by all services
//! - Unknown service names fail fast, they are never silently ignored
//! - Every attempt updates exactly one breaker
//! - Non-2xx responses are failures, like transport errors and timeouts

use std::collections::{BTreeMap, HashMap};
use std::error::Error as StdError;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, Method, Request};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::Value;
use tokio::sync::broadcast;
use url::Url;

use crate::config::ServiceConfig;
use crate::dispatch::error::{DispatchError, DownstreamError};
use crate::dispatch::request::{DownstreamResponse, RequestSpec};
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;
use crate::resilience::{BreakerSnapshot, CircuitBreaker, CircuitState, RetryError, RetryEvent, RetryPolicy};

/// Largest downstream payload the dispatcher will buffer.
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Everything registered for one downstream service.
#[derive(Debug)]
struct ServiceEntry {
    name: String,
    base_url: String,
    timeout: Duration,
    breaker: CircuitBreaker,
    retry: Option<RetryPolicy>,
}

/// Single entry point for downstream calls.
#[derive(Debug)]
pub struct ServiceDispatcher {
    services: HashMap<String, ServiceEntry>,
    client: Client<HttpConnector, Body>,
}

impl ServiceDispatcher {
    /// Build the dispatcher and one breaker/retry pair per configured service.
    pub fn new(configs: &[ServiceConfig]) -> Self {
        let mut services = HashMap::new();

        for config in configs {
            if services.contains_key(&config.name) {
                tracing::warn!(service = %config.name, "Duplicate service definition ignored");
                continue;
            }
            if let Err(e) = Url::parse(&config.base_url) {
                tracing::warn!(service = %config.name, base_url = %config.base_url, error = %e, "Invalid base URL, service skipped");
                continue;
            }

            let entry = ServiceEntry {
                name: config.name.clone(),
                base_url: config.base_url.clone(),
                timeout: Duration::from_millis(config.request_timeout_ms),
                breaker: CircuitBreaker::new(&config.name, config.circuit_breaker.unwrap_or_default()),
                retry: config
                    .retry
                    .clone()
                    .map(|retry| RetryPolicy::new(&config.name, retry)),
            };
            tracing::debug!(
                service = %entry.name,
                base_url = %entry.base_url,
                timeout_ms = config.request_timeout_ms,
                retries = entry.retry.is_some(),
                "Registered downstream service"
            );
            services.insert(config.name.clone(), entry);
        }

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self { services, client }
    }

    /// Send `spec` to the named service.
    pub async fn request(&self, service: &str, spec: RequestSpec) -> Result<DownstreamResponse, DispatchError> {
        let entry = self
            .services
            .get(service)
            .ok_or_else(|| DispatchError::UnknownService(service.to_string()))?;
        let spec = &spec;

        match &entry.retry {
            Some(policy) => policy
                .execute(move || self.attempt(entry, spec))
                .await
                .map_err(|e| match e {
                    RetryError::Exhausted { attempts, last } => DispatchError::RetryExhausted {
                        service: entry.name.clone(),
                        attempts,
                        cause: Box::new(last),
                    },
                    RetryError::Aborted(error) => error,
                }),
            None => self.attempt(entry, spec).await,
        }
    }

    pub async fn get(&self, service: &str, path: &str) -> Result<DownstreamResponse, DispatchError> {
        self.request(service, RequestSpec::new(Method::GET, path)).await
    }

    pub async fn post(&self, service: &str, path: &str, body: Value) -> Result<DownstreamResponse, DispatchError> {
        self.request(service, RequestSpec::new(Method::POST, path).with_body(body)).await
    }

    pub async fn put(&self, service: &str, path: &str, body: Value) -> Result<DownstreamResponse, DispatchError> {
        self.request(service, RequestSpec::new(Method::PUT, path).with_body(body)).await
    }

    pub async fn patch(&self, service: &str, path: &str, body: Value) -> Result<DownstreamResponse, DispatchError> {
        self.request(service, RequestSpec::new(Method::PATCH, path).with_body(body)).await
    }

    pub async fn delete(&self, service: &str, path: &str) -> Result<DownstreamResponse, DispatchError> {
        self.request(service, RequestSpec::new(Method::DELETE, path)).await
    }

    /// Breaker state of one service, `None` if it is not registered.
    pub fn breaker_status(&self, service: &str) -> Option<CircuitState> {
        self.services.get(service).map(|entry| entry.breaker.state())
    }

    /// Breaker state of every service, ordered by name.
    pub fn breaker_statuses(&self) -> BTreeMap<String, CircuitState> {
        self.services
            .iter()
            .map(|(name, entry)| (name.clone(), entry.breaker.state()))
            .collect()
    }

    /// Detailed breaker view of one service.
    pub fn breaker_snapshot(&self, service: &str) -> Option<BreakerSnapshot> {
        self.services.get(service).map(|entry| entry.breaker.snapshot())
    }

    /// Retry events of one service; `None` if it is unknown or has no retry policy.
    pub fn subscribe_retries(&self, service: &str) -> Option<broadcast::Receiver<RetryEvent>> {
        self.services
            .get(service)
            .and_then(|entry| entry.retry.as_ref())
            .map(RetryPolicy::subscribe)
    }

    /// Names of all registered services, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    /// One breaker-protected attempt.
    async fn attempt(&self, entry: &ServiceEntry, spec: &RequestSpec) -> Result<DownstreamResponse, DispatchError> {
        let Some(permit) = entry.breaker.begin() else {
            tracing::debug!(service = %entry.name, "Circuit open, failing fast");
            metrics::record_downstream(&entry.name, "circuit_open", None);
            return Err(DispatchError::CircuitOpen {
                service: entry.name.clone(),
            });
        };

        let start = Instant::now();
        match self.send(entry, spec).await {
            Ok(response) => {
                permit.success();
                metrics::record_downstream(&entry.name, "success", Some(start));
                Ok(response)
            }
            Err(e) => {
                permit.failure();
                tracing::warn!(
                    service = %entry.name,
                    method = %spec.method,
                    path = %spec.path,
                    error = %e,
                    "Downstream request failed"
                );
                metrics::record_downstream(&entry.name, "failure", Some(start));
                Err(e.into())
            }
        }
    }

    async fn send(&self, entry: &ServiceEntry, spec: &RequestSpec) -> Result<DownstreamResponse, DownstreamError> {
        let mut builder = Request::builder()
            .method(spec.method.clone())
            .uri(spec.target(&entry.base_url));

        if let Some(headers) = builder.headers_mut() {
            for (name, value) in spec.headers.iter() {
                headers.append(name.clone(), value.clone());
            }
            if spec.body.is_some() {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
        }

        let body = match &spec.body {
            Some(value) => Body::from(
                serde_json::to_vec(value).map_err(|e| DownstreamError::InvalidRequest(e.to_string()))?,
            ),
            None => Body::empty(),
        };
        let request = builder
            .body(body)
            .map_err(|e| DownstreamError::InvalidRequest(e.to_string()))?;

        with_timeout(entry.timeout, async {
            let response = self.client.request(request).await.map_err(|e| {
                if e.is_connect() {
                    DownstreamError::Connect(describe(&e))
                } else {
                    DownstreamError::Transport(describe(&e))
                }
            })?;

            let (parts, body) = response.into_parts();
            let body = read_body(body).await?;

            if parts.status.is_success() {
                Ok(DownstreamResponse {
                    status: parts.status,
                    headers: parts.headers,
                    body,
                })
            } else {
                Err(DownstreamError::Status {
                    status: parts.status,
                    body,
                })
            }
        })
        .await
    }
}

async fn read_body(body: Incoming) -> Result<Bytes, DownstreamError> {
    axum::body::to_bytes(Body::new(body), MAX_RESPONSE_BYTES)
        .await
        .map_err(|e| DownstreamError::Transport(e.to_string()))
}

/// Flatten an error and its sources into one line.
fn describe(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, RetryConfig};

    fn dispatcher() -> ServiceDispatcher {
        let mut orders = ServiceConfig::new("orders", "http://127.0.0.1:1");
        orders.circuit_breaker = Some(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout_ms: 60_000,
        });
        orders.retry = Some(RetryConfig::default());

        ServiceDispatcher::new(&[
            orders,
            ServiceConfig::new("payments", "http://127.0.0.1:2"),
            ServiceConfig::new("payments", "http://127.0.0.1:3"),
            ServiceConfig::new("broken", "::not a url::"),
        ])
    }

    #[test]
    fn test_registry() {
        let dispatcher = dispatcher();
        assert_eq!(dispatcher.service_names(), vec!["orders".to_string(), "payments".to_string()]);
        assert_eq!(dispatcher.breaker_status("orders"), Some(CircuitState::Closed));
        assert_eq!(dispatcher.breaker_status("broken"), None);
        assert!(dispatcher.subscribe_retries("orders").is_some());
        assert!(dispatcher.subscribe_retries("payments").is_none());

        let statuses = dispatcher.breaker_statuses();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.values().all(|s| *s == CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let dispatcher = dispatcher();
        let err = dispatcher.get("inventory", "/items").await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownService(ref name) if name == "inventory"));
    }

    #[tokio::test]
    async fn test_open_circuit_fails_fast_without_retry_policy() {
        let dispatcher = ServiceDispatcher::new(&[{
            let mut svc = ServiceConfig::new("payments", "http://127.0.0.1:9");
            svc.circuit_breaker = Some(CircuitBreakerConfig {
                failure_threshold: 1,
                reset_timeout_ms: 60_000,
            });
            svc
        }]);

        // Nothing listens on the discard port, the connect failure trips the breaker
        let first = dispatcher.get("payments", "/charges").await.unwrap_err();
        assert!(matches!(first, DispatchError::Downstream(_)));
        assert_eq!(dispatcher.breaker_status("payments"), Some(CircuitState::Open));

        let second = dispatcher.get("payments", "/charges").await.unwrap_err();
        assert!(matches!(second, DispatchError::CircuitOpen { .. }));
    }
}
