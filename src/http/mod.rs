//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers: request ID, trace, throttle, request log)
//!     → proxy.rs (decode body, forward to the dispatcher, relay the answer)
//!     → admin handlers (operational surface)
//!     → response.rs (uniform JSON envelope for gateway-made bodies)
//! ```

pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use response::ApiResponse;
pub use server::{AppState, GatewayServer};
