//! Request identity and forwarding helpers.
//!
//! # Responsibilities
//! - Generate a UUID v4 request ID when the client did not send one
//! - Select the inbound headers that are forwarded downstream
//!
//! # Design Decisions
//! - Request ID added as early as possible so every log line carries it
//! - Forwarding uses an allow-list; hop-by-hop and client-specific headers
//!   never reach a downstream

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Inbound headers copied onto downstream calls.
pub const FORWARDED_HEADERS: [&str; 3] = ["authorization", "accept", X_REQUEST_ID];

/// Generates `x-request-id` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Request ID of an inbound request, `"unknown"` when missing.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Copy the allow-listed headers out of `headers`.
pub fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for name in FORWARDED_HEADERS {
        for value in headers.get_all(name) {
            forwarded.append(HeaderName::from_static(name), value.clone());
        }
    }
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn test_request_id_is_uuid() {
        let request = Request::builder().body(()).unwrap();
        let id = UuidRequestId.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(value).is_ok());
    }

    #[test]
    fn test_forwarded_headers_allow_list() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("session=1"));
        headers.insert(header::HOST, HeaderValue::from_static("gateway"));

        let forwarded = forwarded_headers(&headers);
        assert_eq!(forwarded.len(), 3);
        assert!(forwarded.get(header::COOKIE).is_none());
        assert_eq!(request_id(&forwarded), "abc");
        assert_eq!(request_id(&HeaderMap::new()), "unknown");
    }
}
