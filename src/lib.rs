//! Service gateway: resilient dispatch to named downstream services.
//!
//! Inbound requests pass the admission throttle, are recorded by the request
//! log, and are forwarded by the [`ServiceDispatcher`], which wraps every
//! call in the target service's circuit breaker and optional retry policy.

pub mod admin;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::GatewayConfig;
pub use dispatch::{DispatchError, ServiceDispatcher};
pub use error::GatewayError;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
