//! Gateway request handlers.
//!
//! # Data Flow
//! ```text
//! ANY /api/{service}/{*path}
//!     → read and decode the JSON body (400 on malformed input)
//!     → copy allow-listed headers, keep the query string
//!     → ServiceDispatcher::request
//!     → relay downstream status, content type and body
//! ```

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::dispatch::{DispatchError, DownstreamError, RequestSpec};
use crate::error::GatewayError;
use crate::http::request::{forwarded_headers, request_id};
use crate::http::response::ApiResponse;
use crate::http::server::AppState;

/// Forward a request to the named downstream service.
pub async fn proxy_handler(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
) -> Result<Response, GatewayError> {
    let service = params.get("service").cloned().unwrap_or_default();
    let mut path = format!(
        "/{}",
        params.get("path").map(String::as_str).unwrap_or("").trim_start_matches('/')
    );
    if let Some(query) = request.uri().query() {
        path.push('?');
        path.push_str(query);
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| GatewayError::bad_request("Request body could not be read", vec![e.to_string()]))?;
    let body = if bytes.is_empty() {
        None
    } else {
        Some(
            serde_json::from_slice::<Value>(&bytes)
                .map_err(|e| GatewayError::bad_request("Invalid JSON body", vec![e.to_string()]))?,
        )
    };

    tracing::debug!(
        request_id = %request_id(&parts.headers),
        service = %service,
        method = %parts.method,
        path = %path,
        "Dispatching request"
    );

    let spec = RequestSpec {
        method: parts.method,
        path,
        body,
        headers: forwarded_headers(&parts.headers),
    };

    match state.dispatcher.request(&service, spec).await {
        Ok(response) => Ok(relay(response.status, response.content_type().cloned(), response.body)),
        Err(e) => match e.root_cause() {
            // Client errors are the downstream's answer, not a gateway failure
            DispatchError::Downstream(DownstreamError::Status { status, body }) if status.is_client_error() => {
                let content_type = serde_json::from_slice::<serde::de::IgnoredAny>(body)
                    .ok()
                    .map(|_| HeaderValue::from_static("application/json"));
                Ok(relay(*status, content_type, body.clone()))
            }
            _ => Err(e.into()),
        },
    }
}

/// Liveness check.
pub async fn health_handler() -> ApiResponse {
    ApiResponse::message("ok")
}

fn relay(status: StatusCode, content_type: Option<HeaderValue>, body: Bytes) -> Response {
    let mut response = (status, body).into_response();
    match content_type {
        Some(value) => {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        None => {
            response.headers_mut().remove(header::CONTENT_TYPE);
        }
    }
    response
}
