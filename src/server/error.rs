//! HTTP error responses: a status code plus `{"detail": "..."}`.

use crate::error::ServiceError;
use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// JSON error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub detail: String,
}

/// An error ready to be sent to the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    /// Error with an explicit status.
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    /// Status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Detail message.
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::GenerationFailed(_)
            | ServiceError::Model(_)
            | ServiceError::Config(_)
            | ServiceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status(), format!("invalid multipart body: {}", err.body_text()))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(err: MultipartRejection) -> Self {
        Self::new(err.status(), err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, detail = %self.detail, "request failed");
        } else {
            tracing::info!(status = %self.status, detail = %self.detail, "request rejected");
        }
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn service_errors_map_to_status_codes() {
        let cases = [
            (ServiceError::invalid("text must not be empty"), StatusCode::BAD_REQUEST),
            (
                ServiceError::ServiceUnavailable("turbo model not loaded".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServiceError::GenerationFailed("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn detail_carries_underlying_message() {
        let err = ApiError::from(ServiceError::GenerationFailed("CUDA out of memory".into()));
        assert!(err.detail().contains("CUDA out of memory"));
    }

    #[test]
    fn error_body_serializes_detail_only() {
        let json = serde_json::to_value(ErrorBody {
            detail: "bad".to_owned(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"detail": "bad"}));
    }
}
