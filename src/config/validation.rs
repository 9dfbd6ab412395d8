//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject duplicate or malformed downstream definitions
//! - Validate value ranges (timeouts > 0, thresholds >= 1)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, RateLimitKey, ServiceConfig};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g. `services[orders].base_url`).
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let mut seen = HashSet::new();
    for (index, service) in config.services.iter().enumerate() {
        if service.name.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("services[{}].name", index),
                "must not be empty",
            ));
        } else if !seen.insert(service.name.as_str()) {
            errors.push(ValidationError::new(
                format!("services[{}].name", service.name),
                "duplicate service name",
            ));
        }
        validate_service(service, &mut errors);
    }

    let rl = &config.rate_limit;
    if rl.max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests", "must be at least 1"));
    }
    if rl.window_ms == 0 {
        errors.push(ValidationError::new("rate_limit.window_ms", "must be greater than 0"));
    }
    if rl.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.sweep_interval_secs",
            "must be greater than 0",
        ));
    }
    if let RateLimitKey::Header { name } = &rl.key_by {
        if axum::http::HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "rate_limit.key_by.name",
                format!("'{}' is not a valid header name", name),
            ));
        }
    }

    if config.request_log.capacity == 0 {
        errors.push(ValidationError::new("request_log.capacity", "must be at least 1"));
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be set when admin endpoints are enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_service(service: &ServiceConfig, errors: &mut Vec<ValidationError>) {
    let field = |name: &str| format!("services[{}].{}", service.name, name);

    match Url::parse(&service.base_url) {
        Ok(url) if url.scheme() != "http" => errors.push(ValidationError::new(
            field("base_url"),
            format!("unsupported scheme '{}', expected http", url.scheme()),
        )),
        Ok(url) if url.host_str().is_none() => {
            errors.push(ValidationError::new(field("base_url"), "missing host"))
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new(
            field("base_url"),
            format!("'{}' is not a valid URL: {}", service.base_url, e),
        )),
    }

    if service.request_timeout_ms == 0 {
        errors.push(ValidationError::new(field("request_timeout_ms"), "must be greater than 0"));
    }

    if let Some(cb) = &service.circuit_breaker {
        if cb.failure_threshold == 0 {
            errors.push(ValidationError::new(
                field("circuit_breaker.failure_threshold"),
                "must be at least 1",
            ));
        }
    }

    if let Some(retry) = &service.retry {
        if retry.max_attempts == 0 {
            errors.push(ValidationError::new(field("retry.max_attempts"), "must be at least 1"));
        }
        if retry.backoff_multiplier.is_nan() || retry.backoff_multiplier < 1.0 {
            errors.push(ValidationError::new(
                field("retry.backoff_multiplier"),
                "must be at least 1.0",
            ));
        }
        if retry.max_delay_ms < retry.initial_delay_ms {
            errors.push(ValidationError::new(
                field("retry.max_delay_ms"),
                "must not be smaller than initial_delay_ms",
            ));
        }
        if !(0.0..=1.0).contains(&retry.jitter_ratio) {
            errors.push(ValidationError::new(
                field("retry.jitter_ratio"),
                "must be between 0.0 and 1.0",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{CircuitBreakerConfig, RetryConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_valid_service() {
        let mut config = GatewayConfig::default();
        let mut orders = ServiceConfig::new("orders", "http://127.0.0.1:4001");
        orders.circuit_breaker = Some(CircuitBreakerConfig::default());
        orders.retry = Some(RetryConfig::default());
        config.services.push(orders);

        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.services.push(ServiceConfig::new("orders", "http://127.0.0.1:4001"));
        config.services.push(ServiceConfig::new("orders", "not a url"));

        let mut payments = ServiceConfig::new("payments", "https://payments.internal");
        payments.request_timeout_ms = 0;
        payments.retry = Some(RetryConfig {
            max_attempts: 0,
            backoff_multiplier: 0.5,
            initial_delay_ms: 500,
            max_delay_ms: 100,
            ..RetryConfig::default()
        });
        config.services.push(payments);
        config.rate_limit.window_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();

        assert!(fields.contains(&"services[orders].name"));
        assert!(fields.contains(&"services[orders].base_url"));
        assert!(fields.contains(&"services[payments].base_url"));
        assert!(fields.contains(&"services[payments].request_timeout_ms"));
        assert!(fields.contains(&"services[payments].retry.max_attempts"));
        assert!(fields.contains(&"services[payments].retry.backoff_multiplier"));
        assert!(fields.contains(&"services[payments].retry.max_delay_ms"));
        assert!(fields.contains(&"rate_limit.window_ms"));
        assert_eq!(errors.len(), 8);
    }

    #[test]
    fn test_admin_requires_key() {
        let mut config = GatewayConfig::default();
        config.admin.enabled = true;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "admin.api_key: must be set when admin endpoints are enabled");
    }
}
