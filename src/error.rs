// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.
//!
//! Every handler funnels failures through [`AppError`]; no handler writes
//! its own ad-hoc error response. Authentication messages stay generic to
//! avoid account enumeration.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Generic expired-session message used wherever token validation
    /// fails, so a probe cannot distinguish the cause.
    pub fn session_expired() -> Self {
        AppError::Unauthorized(
            "Your session has expired or is no longer available. Please log in again to continue."
                .to_string(),
        )
    }
}

impl From<crate::crypto::CryptoError> for AppError {
    fn from(_: crate::crypto::CryptoError) -> Self {
        AppError::session_expired()
    }
}

/// JSON error envelope: `{status, message}`.
#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, message) = match &self {
            // Duplicate signups use 400 over 409 for uniform client handling.
            AppError::Validation(msg) | AppError::Conflict(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Upstream(msg) => {
                tracing::error!(error = %msg, "Upstream failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong. Please try again later.".to_string(),
                )
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong. Please try again later.".to_string(),
                )
            }
        };

        let status = if status_code.is_server_error() {
            "error"
        } else {
            "fail"
        };

        (status_code, Json(ErrorResponse { status, message })).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
