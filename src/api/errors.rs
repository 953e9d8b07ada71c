use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::errors::AssessmentError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    code: &'static str,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    Conflict { code: &'static str, detail: String },
    Unprocessable { code: &'static str, detail: String },
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Unauthorized(detail) => (StatusCode::UNAUTHORIZED, "unauthorized", detail),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "validation_error", detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "not_found", detail),
            ApiError::Conflict { code, detail } => (StatusCode::CONFLICT, code, detail),
            ApiError::Unprocessable { code, detail } => {
                (StatusCode::UNPROCESSABLE_ENTITY, code, detail)
            }
            ApiError::Internal(detail) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", detail)
            }
        }
    }
}

impl From<AssessmentError> for ApiError {
    fn from(err: AssessmentError) -> Self {
        let code = err.kind();
        match err {
            AssessmentError::Validation(detail) => ApiError::BadRequest(detail),
            AssessmentError::Unauthorized(detail) => ApiError::Unauthorized(detail),
            AssessmentError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            AssessmentError::InvalidStateTransition(_)
            | AssessmentError::AttemptLimitExceeded { .. }
            | AssessmentError::ConcurrentAttemptConflict
            | AssessmentError::GradingIncomplete { .. } => {
                ApiError::Conflict { code, detail: err.to_string() }
            }
            AssessmentError::PolicyViolation(_)
            | AssessmentError::InsufficientPool { .. }
            | AssessmentError::GradingOutOfRange { .. } => {
                ApiError::Unprocessable { code, detail: err.to_string() }
            }
            AssessmentError::Store(inner) => ApiError::internal(inner, "Storage operation failed"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, detail) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %detail, "Internal server error");
        }
        (status, Json(ErrorResponse { status: status.as_u16(), code, detail })).into_response()
    }
}
