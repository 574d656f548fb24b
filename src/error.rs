// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

use crate::models::test_definition::LifecycleState;
use crate::store::StoreError;

/// Global Application Error Enum.
/// Carries both transport-level failures and the assessment domain taxonomy,
/// and maps each of them to an HTTP response.
#[derive(Debug, Error)]
pub enum AppError {
    // 500 Internal Server Error
    #[error("internal server error: {0}")]
    InternalServerError(String),

    // 400 Bad Request
    #[error("{0}")]
    BadRequest(String),

    // 401 Unauthorized
    #[error("{0}")]
    AuthError(String),

    // 403 Forbidden
    #[error("{0}")]
    Forbidden(String),

    // 404 Not Found
    #[error("{0}")]
    NotFound(String),

    // 409 Conflict (e.g., today's auto-test already completed)
    #[error("{0}")]
    Conflict(String),

    /// The candidate pool cannot supply the questions a test needs.
    #[error("insufficient questions: requested {requested}, available {available}")]
    InsufficientQuestions { requested: usize, available: usize },

    /// An attempt was started outside the test window.
    #[error("test is not active (currently {0:?})")]
    TestNotActive(LifecycleState),

    /// The personal deadline of the session has passed; the session was submitted.
    #[error("session expired at {deadline}")]
    SessionExpired { deadline: DateTime<Utc> },

    /// The score exists but the release gate still hides it.
    #[error("result not yet released")]
    ResultNotYetReleased { available_at: Option<DateTime<Utc>> },
}

impl AppError {
    /// Stable machine-readable kind, sent to clients next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InternalServerError(_) => "internal",
            AppError::BadRequest(_) => "bad_request",
            AppError::AuthError(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::InsufficientQuestions { .. } => "insufficient_questions",
            AppError::TestNotActive(_) => "test_not_active",
            AppError::SessionExpired { .. } => "session_expired",
            AppError::ResultNotYetReleased { .. } => "result_not_yet_released",
        }
    }
}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = match &self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal Server Error", "code": code })),
                )
                    .into_response();
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::TestNotActive(_) => StatusCode::CONFLICT,
            AppError::InsufficientQuestions { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::SessionExpired { .. } => StatusCode::GONE,
            AppError::ResultNotYetReleased { .. } => StatusCode::FORBIDDEN,
        };

        let mut body = json!({
            "error": self.to_string(),
            "code": code,
        });
        match &self {
            AppError::SessionExpired { deadline } => body["deadline"] = json!(deadline),
            AppError::ResultNotYetReleased { available_at } => {
                body["available_at"] = json!(available_at)
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

/// Converts store failures into `AppError::InternalServerError`.
/// Allows using `?` operator on document store calls.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
