//! Downstream dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! request(service, RequestSpec)
//!     → dispatcher.rs (resolve service entry or UnknownService)
//!     → retry policy (if configured)
//!         → circuit breaker check (CircuitOpen when rejected)
//!         → HTTP call with per-service timeout
//!         → record success / failure on the breaker
//!     → DownstreamResponse or DispatchError
//! ```

pub mod dispatcher;
pub mod error;
pub mod request;

pub use dispatcher::ServiceDispatcher;
pub use error::{DispatchError, DownstreamError};
pub use request::{DownstreamResponse, RequestSpec};
