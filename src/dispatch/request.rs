//! Request and response shapes for downstream calls.

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A call to make against a downstream service.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    /// Path (and optional query) appended to the service base URL.
    pub path: String,
    /// JSON body, sent with `content-type: application/json`.
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Full URI for a service rooted at `base`.
    pub(crate) fn target(&self, base: &str) -> String {
        let base = base.trim_end_matches('/');
        if self.path.starts_with('/') {
            format!("{}{}", base, self.path)
        } else {
            format!("{}/{}", base, self.path)
        }
    }
}

/// A successful downstream response.
#[derive(Debug, Clone)]
pub struct DownstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl DownstreamResponse {
    /// Decode the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Content type reported by the downstream, if any.
    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.headers.get(header::CONTENT_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_joins_slashes() {
        let spec = RequestSpec::get("/orders/42?expand=items");
        assert_eq!(spec.target("http://orders:4001"), "http://orders:4001/orders/42?expand=items");
        assert_eq!(spec.target("http://orders:4001/"), "http://orders:4001/orders/42?expand=items");
        assert_eq!(spec.target("http://host/v1"), "http://host/v1/orders/42?expand=items");

        let relative = RequestSpec::get("health");
        assert_eq!(relative.target("http://orders:4001"), "http://orders:4001/health");
    }

    #[test]
    fn test_json_payload() {
        let response = DownstreamResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(br#"{"id":42}"#),
        };
        let value: Value = response.json().unwrap();
        assert_eq!(value, json!({"id": 42}));
        assert!(response.content_type().is_none());
    }
}
