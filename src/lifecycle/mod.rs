//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → stop accepting → drain in-flight requests
//!             → background tasks (counter sweeper) exit their loops
//! ```
//!
//! # Design Decisions
//! - One broadcast channel reaches every long-running task
//! - The server drains in-flight requests before returning

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
