//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (Prometheus counters, gauges, histograms)
//!
//! The gateway layers additionally feed:
//!     → request_log.rs (bounded request history for the admin surface)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through all log events via the trace span
//! - Metric updates are cheap and safe to call without an exporter

pub mod logging;
pub mod metrics;
pub mod request_log;

pub use request_log::{MetricRecord, RequestLog, RequestStats, WindowStats, WindowedStats};
