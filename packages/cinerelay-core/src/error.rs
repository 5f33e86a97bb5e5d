//! Centralized error types for the CineRelay core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths (HTTP responses and plugin socket replies).
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the relay server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum RelayError {
    /// Caller sent an invalid or malformed request (missing target, bad field types).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Shared secret missing or wrong.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error (invalid or missing settings).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ErrorCode for RelayError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

impl RelayError {
    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Builds the JSON body shared by HTTP error responses and plugin replies.
    pub fn to_body(&self) -> serde_json::Value {
        let status = self.status_code();
        serde_json::to_value(ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        })
        .unwrap_or(serde_json::Value::Null)
    }
}

/// Convenient Result alias for application-wide operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self.to_body())).into_response()
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_maps_to_bad_request() {
        let err = RelayError::InvalidRequest("url required".into());
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let err = RelayError::Unauthorized("bad admin key".into());
        assert_eq!(err.code(), "unauthorized");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn body_carries_code_message_and_status() {
        let body = RelayError::InvalidRequest("url required".into()).to_body();
        assert_eq!(body["error"], "invalid_request");
        assert_eq!(body["message"], "Invalid request: url required");
        assert_eq!(body["status"], 400);
    }

    #[test]
    fn json_errors_become_invalid_request() {
        let parse_err = serde_json::from_str::<u64>("\"nope\"").unwrap_err();
        let err: RelayError = parse_err.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
