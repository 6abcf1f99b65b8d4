//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps domain errors from legal-core, legal-qr and the storage layer to
//! HTTP status codes with a JSON body carrying a code, message and optional
//! details. Server-side failures never expose their cause to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::store::StoreError;

/// Structured JSON error response body.
///
/// All error responses use this format. `details` carries extra context
/// for client errors and is never set on 5xx responses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("{0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body or query could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("{0}")]
    Unauthorized(String),

    /// Insufficient permissions (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),

    /// Storage unreachable or too slow (503). Message is logged but not
    /// returned to client.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    /// The uniform public not-found error. Missing, malformed and inactive
    /// codes all produce exactly this.
    pub fn record_not_found() -> Self {
        Self::NotFound("record not found".into())
    }

    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => {
                tracing::error!(error = %self, "internal server error");
                "An internal error occurred".to_string()
            }
            Self::ServiceUnavailable(_) => {
                tracing::error!(error = %self, "storage unavailable");
                "Service temporarily unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Convert legal-core validation errors to API errors.
impl From<legal_core::ValidationError> for AppError {
    fn from(err: legal_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Convert storage errors to API errors.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateIdentifier => {
                Self::Internal("identifier collision reached the API layer".into())
            }
            StoreError::DuplicateUsername => Self::Conflict("username already exists".into()),
            StoreError::NotFound => Self::NotFound("not found".into()),
            StoreError::Unavailable(_) | StoreError::Timeout(_) => {
                Self::ServiceUnavailable(err.to_string())
            }
            StoreError::Corrupt(_) => Self::Internal(err.to_string()),
        }
    }
}

/// Convert image rendering faults to API errors.
impl From<legal_qr::RenderError> for AppError {
    fn from(err: legal_qr::RenderError) -> Self {
        Self::Internal(format!("QR render failed: {err}"))
    }
}

/// Convert image file faults to API errors.
impl From<legal_qr::StoreError> for AppError {
    fn from(err: legal_qr::StoreError) -> Self {
        Self::ServiceUnavailable(format!("QR image storage failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::time::Duration;

    async fn response_parts(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (
                AppError::Validation("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
            ),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT, "CONFLICT"),
            (
                AppError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
            (
                AppError::ServiceUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (status, code));
        }
    }

    #[tokio::test]
    async fn record_not_found_body_is_exact() {
        let (status, json) = response_parts(AppError::record_not_found()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            json,
            serde_json::json!({"error": {"code": "NOT_FOUND", "message": "record not found"}})
        );
    }

    #[tokio::test]
    async fn internal_error_hides_message() {
        let (status, json) = response_parts(AppError::Internal("db password=hunter2".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["message"], "An internal error occurred");
        assert!(json["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn unavailable_error_hides_message() {
        let (status, json) =
            response_parts(AppError::ServiceUnavailable("/var/lib/db locked".into())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!json["error"]["message"].as_str().unwrap().contains("/var"));
    }

    #[test]
    fn store_errors_map_to_taxonomy() {
        let status = |e: StoreError| AppError::from(e).status_and_code().0;
        assert_eq!(
            status(StoreError::Timeout(Duration::from_secs(5))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(StoreError::Unavailable("io".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status(StoreError::DuplicateUsername), StatusCode::CONFLICT);
        assert_eq!(status(StoreError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status(StoreError::Corrupt("row".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_error_converts() {
        let err = AppError::from(legal_core::ValidationError::MissingField("document_owner"));
        assert_eq!(err.status_and_code().0, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.to_string().contains("document_owner is required"));
    }

    #[test]
    fn render_error_is_internal() {
        let err = AppError::from(legal_qr::RenderError::EmptyContent);
        assert_eq!(err.status_and_code().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn error_body_skips_empty_details() {
        let body = ErrorBody {
            error: ErrorDetail {
                code: "TEST".to_string(),
                message: "test message".to_string(),
                details: None,
            },
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("TEST"));
        assert!(!json.contains("details"));
    }
}
