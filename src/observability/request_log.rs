//! Bounded in-memory request log with derived statistics.
//!
//! # Responsibilities
//! - Keep the last `capacity` completed requests in arrival order
//! - Answer diagnostic queries (recent, averages, error rates, rankings)
//! - Record every request that passes through the gateway layers
//!
//! # Design Decisions
//! - FIFO eviction; reads never affect eviction order
//! - Queries are linear scans over the bounded window
//! - Path filters are exact matches
//! - State is per process, no cross-replica aggregation

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde::Serialize;

use crate::observability::metrics;

const FIVE_MINUTES_MS: u64 = 5 * 60 * 1000;
const ONE_HOUR_MS: u64 = 60 * 60 * 1000;

/// One completed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricRecord {
    /// Completion time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub response_time_ms: u64,
}

impl MetricRecord {
    fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}

/// Hit count of one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathCount {
    pub path: String,
    pub count: usize,
}

/// Mean latency of one path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathLatency {
    pub path: String,
    pub average_response_time_ms: f64,
    pub count: usize,
}

/// Aggregate over a set of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WindowStats {
    pub requests: usize,
    pub average_response_time_ms: f64,
    /// Percentage of requests with status ≥ 400.
    pub error_rate: f64,
}

/// Aggregates over the most recent time windows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WindowedStats {
    pub last_5_minutes: WindowStats,
    pub last_hour: WindowStats,
}

/// Everything `stats()` reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestStats {
    pub total: WindowStats,
    pub windows: WindowedStats,
    pub capacity: usize,
}

/// Fixed-capacity request log.
#[derive(Debug)]
pub struct RequestLog {
    capacity: usize,
    records: Mutex<VecDeque<MetricRecord>>,
}

impl RequestLog {
    /// Create a log holding at most `capacity` records (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Append a record, evicting the oldest at capacity.
    pub fn record(&self, record: MetricRecord) {
        let mut records = self.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// The last `limit` records, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<MetricRecord> {
        let records = self.lock();
        let skip = records.len().saturating_sub(limit);
        records.iter().skip(skip).cloned().collect()
    }

    /// Mean response time over records matching `path`; 0 when none match.
    pub fn average_response_time(&self, path: Option<&str>) -> f64 {
        let records = self.lock();
        summarize(filter_path(&records, path)).average_response_time_ms
    }

    /// Percentage of records matching `path` with status ≥ 400; 0 when none match.
    pub fn error_rate(&self, path: Option<&str>) -> f64 {
        let records = self.lock();
        summarize(filter_path(&records, path)).error_rate
    }

    /// Paths by hit count, highest first; ties keep first-seen order.
    pub fn top_paths(&self, limit: usize) -> Vec<PathCount> {
        let mut ranked: Vec<PathCount> = group_by_path(&self.lock())
            .into_iter()
            .map(|(path, group)| PathCount {
                path,
                count: group.count,
            })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count));
        ranked.truncate(limit);
        ranked
    }

    /// Paths by mean response time, slowest first; ties keep first-seen order.
    pub fn slowest_endpoints(&self, limit: usize) -> Vec<PathLatency> {
        let mut ranked: Vec<PathLatency> = group_by_path(&self.lock())
            .into_iter()
            .map(|(path, group)| PathLatency {
                path,
                average_response_time_ms: group.total_ms as f64 / group.count as f64,
                count: group.count,
            })
            .collect();
        ranked.sort_by(|a, b| b.average_response_time_ms.total_cmp(&a.average_response_time_ms));
        ranked.truncate(limit);
        ranked
    }

    /// Aggregates for the last 5 minutes and the last hour.
    pub fn windowed_stats(&self) -> WindowedStats {
        self.windowed_stats_at(now_ms())
    }

    /// Aggregates for the windows ending at `now_ms`.
    pub fn windowed_stats_at(&self, now_ms: u64) -> WindowedStats {
        let records = self.lock();
        windows(&records, now_ms)
    }

    /// Totals plus windowed aggregates.
    pub fn stats(&self) -> RequestStats {
        self.stats_at(now_ms())
    }

    pub fn stats_at(&self, now_ms: u64) -> RequestStats {
        let records = self.lock();
        RequestStats {
            total: summarize(records.iter()),
            windows: windows(&records, now_ms),
            capacity: self.capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<MetricRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Middleware recording every request that reaches it.
pub async fn record_requests(State(log): State<Arc<RequestLog>>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    metrics::record_request(&method, status, start);
    log.record(MetricRecord {
        timestamp_ms: now_ms(),
        method,
        path,
        status_code: status,
        response_time_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    });

    response
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn filter_path<'a>(
    records: &'a VecDeque<MetricRecord>,
    path: Option<&'a str>,
) -> impl Iterator<Item = &'a MetricRecord> + 'a {
    records
        .iter()
        .filter(move |record| path.map_or(true, |p| record.path == p))
}

fn summarize<'a>(records: impl Iterator<Item = &'a MetricRecord>) -> WindowStats {
    let (mut requests, mut errors, mut total_ms) = (0usize, 0usize, 0u64);
    for record in records {
        requests += 1;
        total_ms = total_ms.saturating_add(record.response_time_ms);
        if record.is_error() {
            errors += 1;
        }
    }

    if requests == 0 {
        return WindowStats::default();
    }
    WindowStats {
        requests,
        average_response_time_ms: total_ms as f64 / requests as f64,
        error_rate: errors as f64 * 100.0 / requests as f64,
    }
}

fn windows(records: &VecDeque<MetricRecord>, now_ms: u64) -> WindowedStats {
    let since = |span: u64| {
        let cutoff = now_ms.saturating_sub(span);
        records.iter().filter(move |record| record.timestamp_ms >= cutoff)
    };
    WindowedStats {
        last_5_minutes: summarize(since(FIVE_MINUTES_MS)),
        last_hour: summarize(since(ONE_HOUR_MS)),
    }
}

#[derive(Default)]
struct PathGroup {
    count: usize,
    total_ms: u64,
}

/// Per-path totals in first-seen order.
fn group_by_path(records: &VecDeque<MetricRecord>) -> Vec<(String, PathGroup)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(String, PathGroup)> = Vec::new();

    for record in records {
        let slot = *index.entry(record.path.as_str()).or_insert_with(|| {
            groups.push((record.path.clone(), PathGroup::default()));
            groups.len() - 1
        });
        let group = &mut groups[slot].1;
        group.count += 1;
        group.total_ms = group.total_ms.saturating_add(record.response_time_ms);
    }
    groups
}
