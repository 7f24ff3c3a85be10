//! Error handling for the reservoir recommendation engine
//!
//! Request-level failures become JSON error responses. Enrichment failures
//! never reach a client as errors: they are recorded on the cached record.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Input errors
    #[error("Invalid input: {message}")]
    InvalidInput { field: String, message: String },

    #[error("Reservoir not found: {0}")]
    ReservoirNotFound(String),

    #[error("Forecast not found: {0}")]
    ForecastNotFound(String),

    // Collaborator errors
    #[error("Forecast service unavailable: {0}")]
    ForecastUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Errors caused by the request itself rather than by a collaborator
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AppError::InvalidInput { .. }
                | AppError::ReservoirNotFound(_)
                | AppError::ForecastNotFound(_)
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidInput { .. } => "INVALID_INPUT",
            AppError::ReservoirNotFound(_) => "RESERVOIR_NOT_FOUND",
            AppError::ForecastNotFound(_) => "FORECAST_NOT_FOUND",
            AppError::ForecastUnavailable(_) => "FORECAST_UNAVAILABLE",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

/// Why an enrichment attempt did not produce text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentError {
    #[error("enrichment timed out")]
    Timeout,

    #[error("malformed backend response: {0}")]
    Malformed(String),

    /// The backend answered with an error status
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// No connection could be made
    #[error("backend unreachable: {0}")]
    Unreachable(String),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, field) = match &self {
            AppError::InvalidInput { field, message } => {
                (StatusCode::BAD_REQUEST, message.clone(), Some(field.clone()))
            }
            AppError::ReservoirNotFound(id) => (
                StatusCode::NOT_FOUND,
                format!("Reservoir {} not found", id),
                Some("reservoir_id".to_string()),
            ),
            AppError::ForecastNotFound(key) => (
                StatusCode::NOT_FOUND,
                format!("No forecast available for {}", key),
                None,
            ),
            AppError::ForecastUnavailable(_) => (
                StatusCode::BAD_GATEWAY,
                "Forecast service is temporarily unavailable".to_string(),
                None,
            ),
            AppError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Configuration error: {}", msg),
                None,
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "A database error occurred".to_string(),
                None,
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), None),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred".to_string(),
                None,
            ),
        };

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                field,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
