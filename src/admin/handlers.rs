use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::http::response::ApiResponse;
use crate::http::server::AppState;
use crate::observability::request_log::{MetricRecord, PathCount, PathLatency, RequestStats};
use crate::resilience::{BreakerSnapshot, CircuitState};

const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub services: Vec<String>,
    pub open_circuits: usize,
    pub recorded_requests: usize,
}

#[derive(Serialize)]
pub struct ErrorRate {
    pub path: Option<String>,
    pub error_rate: f64,
}

#[derive(Serialize)]
pub struct ResponseTime {
    pub path: Option<String>,
    pub average_response_time_ms: f64,
}

pub async fn get_status(State(state): State<AppState>) -> ApiResponse<SystemStatus> {
    let open_circuits = state
        .dispatcher
        .breaker_statuses()
        .values()
        .filter(|s| **s != CircuitState::Closed)
        .count();

    ApiResponse::ok(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        services: state.dispatcher.service_names(),
        open_circuits,
        recorded_requests: state.request_log.len(),
    })
}

pub async fn get_breakers(State(state): State<AppState>) -> ApiResponse<BTreeMap<String, CircuitState>> {
    ApiResponse::ok(state.dispatcher.breaker_statuses())
}

pub async fn get_breaker(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<ApiResponse<BreakerSnapshot>, GatewayError> {
    state
        .dispatcher
        .breaker_snapshot(&service)
        .map(ApiResponse::ok)
        .ok_or_else(|| GatewayError::NotFound(format!("Unknown service '{service}'")))
}

pub async fn get_recent(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResponse<Vec<MetricRecord>> {
    ApiResponse::ok(state.request_log.recent(query.limit()))
}

pub async fn get_stats(State(state): State<AppState>) -> ApiResponse<RequestStats> {
    ApiResponse::ok(state.request_log.stats())
}

pub async fn get_top_paths(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResponse<Vec<PathCount>> {
    ApiResponse::ok(state.request_log.top_paths(query.limit()))
}

pub async fn get_slowest(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResponse<Vec<PathLatency>> {
    ApiResponse::ok(state.request_log.slowest_endpoints(query.limit()))
}

pub async fn get_error_rate(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> ApiResponse<ErrorRate> {
    let error_rate = state.request_log.error_rate(query.path.as_deref());
    ApiResponse::ok(ErrorRate {
        path: query.path,
        error_rate,
    })
}

pub async fn get_response_time(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> ApiResponse<ResponseTime> {
    let average_response_time_ms = state.request_log.average_response_time(query.path.as_deref());
    ApiResponse::ok(ResponseTime {
        path: query.path,
        average_response_time_ms,
    })
}
