//! Error handling module
//!
//! HTTP-facing error type and response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::RejectedCommand;
use crate::repository::RepositoryError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<RejectedCommand> for AppError {
    fn from(err: RejectedCommand) -> Self {
        AppError::Repository(RepositoryError::Rejected(err))
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn rejection_status(rejection: &RejectedCommand) -> StatusCode {
    match rejection {
        RejectedCommand::AccountNotFound(_) => StatusCode::NOT_FOUND,
        RejectedCommand::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        RejectedCommand::InsufficientFunds { .. }
        | RejectedCommand::AccountClosed(_)
        | RejectedCommand::AccountAlreadyExists(_)
        | RejectedCommand::BalanceOutstanding { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone())),

            AppError::Repository(err) => match err {
                // 4xx: business rule violations
                RepositoryError::Rejected(rejection) => (rejection_status(rejection), rejection.code(), None),
                RepositoryError::NotFound(id) => (StatusCode::NOT_FOUND, "not_found", Some(id.to_string())),

                // 409 Conflict
                RepositoryError::ConcurrencyConflict { actual, .. } => (
                    StatusCode::CONFLICT,
                    "concurrency_conflict",
                    actual.map(|v| format!("current version {v}")),
                ),

                // 5xx: the caller must reload before retrying
                RepositoryError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "outcome_unknown", None),
                RepositoryError::Backend(e) => {
                    tracing::error!("Backend error: {:?}", e);
                    (StatusCode::SERVICE_UNAVAILABLE, "outcome_unknown", None)
                }
                RepositoryError::StoreIntegrity { .. } | RepositoryError::TamperedOrCorrupt { .. } => {
                    tracing::error!("Event log failure: {}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "store_integrity_error", None)
                }
                RepositoryError::Encode(e) => {
                    tracing::error!("Encoding error: {:?}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
                }
            },
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
