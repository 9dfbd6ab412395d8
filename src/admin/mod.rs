//! Operational surface: breaker states and request-log queries.
//!
//! Mounted only when `admin.enabled`; every route requires
//! `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/breakers/{service}", get(get_breaker))
        .route("/admin/metrics/recent", get(get_recent))
        .route("/admin/metrics/stats", get(get_stats))
        .route("/admin/metrics/top-paths", get(get_top_paths))
        .route("/admin/metrics/slowest", get(get_slowest))
        .route("/admin/metrics/error-rate", get(get_error_rate))
        .route("/admin/metrics/response-time", get(get_response_time))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
