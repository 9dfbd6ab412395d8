//! Errors rendered at the HTTP boundary.
//!
//! Every failure a client can see goes through [`GatewayError`], which maps
//! it to a status code and the `{success:false, message, errors?}` body.
//! Internal detail is logged here and never copied into the body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::dispatch::{DispatchError, DownstreamError};
use crate::http::response::ApiResponse;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("{message}")]
    BadRequest { message: String, errors: Vec<String> },

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),
}

impl GatewayError {
    pub fn bad_request(message: impl Into<String>, errors: Vec<String>) -> Self {
        GatewayError::BadRequest {
            message: message.into(),
            errors,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Dispatch(e) => dispatch_status(e),
            GatewayError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            GatewayError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Client-facing message.
    fn public_message(&self) -> String {
        match self {
            GatewayError::Dispatch(e) => dispatch_message(e),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = match self {
            GatewayError::BadRequest { message, errors } => {
                ApiResponse::failure(message).with_errors(errors)
            }
            other => ApiResponse::failure(other.public_message()),
        };
        (status, body).into_response()
    }
}

fn dispatch_status(error: &DispatchError) -> StatusCode {
    match error {
        DispatchError::UnknownService(_) => StatusCode::NOT_FOUND,
        DispatchError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::RetryExhausted { cause, .. } => dispatch_status(cause),
        DispatchError::Downstream(e) => downstream_status(e),
    }
}

fn downstream_status(error: &DownstreamError) -> StatusCode {
    match error {
        DownstreamError::Status { status, .. } if status.is_server_error() => StatusCode::BAD_GATEWAY,
        DownstreamError::Status { status, .. } => *status,
        DownstreamError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        DownstreamError::Connect(_) | DownstreamError::Transport(_) => StatusCode::BAD_GATEWAY,
        DownstreamError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
    }
}

fn dispatch_message(error: &DispatchError) -> String {
    match error {
        DispatchError::UnknownService(name) => format!("Unknown service '{name}'"),
        DispatchError::CircuitOpen { service } => format!("Service '{service}' is temporarily unavailable"),
        DispatchError::RetryExhausted { service, attempts, .. } => {
            format!("Service '{service}' is unavailable after {attempts} attempts")
        }
        DispatchError::Downstream(e) => match e {
            DownstreamError::Status { status, .. } => format!("Downstream service responded with {}", status.as_u16()),
            DownstreamError::Timeout { .. } => "Downstream service timed out".to_string(),
            DownstreamError::Connect(_) | DownstreamError::Transport(_) => {
                "Downstream service is unreachable".to_string()
            }
            DownstreamError::InvalidRequest(_) => "Invalid downstream request".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    fn status_of(error: DispatchError) -> StatusCode {
        GatewayError::from(error).status_code()
    }

    #[test]
    fn test_dispatch_status_mapping() {
        assert_eq!(status_of(DispatchError::UnknownService("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(DispatchError::CircuitOpen { service: "x".into() }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(DownstreamError::Timeout { after_ms: 10 }.into()),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(DownstreamError::Connect("refused".into()).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(
                DownstreamError::Status {
                    status: StatusCode::NOT_FOUND,
                    body: Bytes::new()
                }
                .into()
            ),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                DownstreamError::Status {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: Bytes::new()
                }
                .into()
            ),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_retry_exhausted_maps_through_cause() {
        let err = DispatchError::RetryExhausted {
            service: "orders".into(),
            attempts: 3,
            cause: Box::new(DownstreamError::Timeout { after_ms: 10 }.into()),
        };
        assert_eq!(status_of(err), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_message_hides_internal_detail() {
        let err = GatewayError::from(DispatchError::from(DownstreamError::Connect(
            "tcp connect error: 10.0.0.7:4001".into(),
        )));
        assert_eq!(err.public_message(), "Downstream service is unreachable");
    }
}
