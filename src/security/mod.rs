//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (derive key, count hit, admit or reject)
//!         → store.rs (atomic increment + TTL per key)
//!     → Pass to request logging and routing
//! ```
//!
//! # Design Decisions
//! - Admission control runs before any downstream work
//! - Fail open: an unavailable counter store never blocks traffic

pub mod rate_limit;
pub mod store;

pub use rate_limit::{rate_limit_middleware, Admission, AdmissionThrottle, RateLimitStatus};
pub use store::{CounterStore, MemoryCounterStore, StoreError};
