//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Downstream service definitions, keyed by unique name.
    pub services: Vec<ServiceConfig>,

    /// Admission throttle configuration.
    pub rate_limit: RateLimitConfig,

    /// In-memory request log (metrics aggregator) settings.
    pub request_log: RequestLogConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Operational endpoints.
    pub admin: AdminConfig,
}

impl GatewayConfig {
    /// Look up a downstream service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// A single downstream service the dispatcher can address.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Unique service identifier (e.g. "orders").
    pub name: String,

    /// Base URL every request path is appended to (e.g. "http://127.0.0.1:4001").
    pub base_url: String,

    /// Deadline for a single downstream attempt, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Circuit breaker policy. A default policy applies when omitted.
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,

    /// Retry policy. Calls are attempted once when omitted.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl ServiceConfig {
    /// Create a service entry with default timeout and no policies.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            request_timeout_ms: default_request_timeout_ms(),
            circuit_breaker: None,
            retry: None,
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Circuit breaker policy for one downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Cool-down before a half-open trial call is allowed, in milliseconds.
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
        }
    }
}

/// Retry policy for one downstream.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds.
    pub initial_delay_ms: u64,

    /// Factor applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,

    /// Upper bound for any single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Error markers that are worth retrying. Empty means every error is.
    pub retryable_errors: Vec<String>,

    /// Random jitter added to each delay, as a fraction of it (0.0 = none).
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            retryable_errors: Vec::new(),
            jitter_ratio: 0.0,
        }
    }
}

/// How the throttle derives a client key from a request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateLimitKey {
    /// Remote peer IP address.
    #[default]
    ClientIp,
    /// Value of a request header, falling back to the client IP when absent.
    Header { name: String },
}

/// Admission throttle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable admission control.
    pub enabled: bool,

    /// Requests allowed per key within one window.
    pub max_requests: u64,

    /// Window length in milliseconds.
    pub window_ms: u64,

    /// Key function.
    pub key_by: RateLimitKey,

    /// Paths that bypass the throttle (exact match).
    pub exempt_paths: Vec<String>,

    /// How often expired counters are purged from the in-memory store, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_ms: 60_000,
            key_by: RateLimitKey::ClientIp,
            exempt_paths: vec!["/health".to_string()],
            sweep_interval_secs: 30,
        }
    }
}

/// Request log settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestLogConfig {
    /// Maximum number of retained request records.
    pub capacity: usize,
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable output for development.
    #[default]
    Pretty,
    /// One JSON object per line for log aggregation.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Operational endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Require a bearer token on `/admin/*`.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
        }
    }
}
