//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use itl_core::ItlError;
use itl_sync::SyncError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new("PRECONDITION_FAILED", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    /// Structural problems with the request or payload
    BadRequest(String),
    /// Well-formed request that cannot be applied
    Unprocessable(String),
    Internal(String),
    Database(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::not_found(&msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::Unprocessable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiError::unprocessable(msg),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal_error().with_details(msg),
            ),
            AppError::Database(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("DATABASE_ERROR", "Database operation failed").with_details(msg),
            ),
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<ItlError> for AppError {
    fn from(err: ItlError) -> Self {
        match err {
            ItlError::NotFound(msg) => AppError::NotFound(msg),
            ItlError::ValidationError(msg) => AppError::BadRequest(msg),
            ItlError::DatabaseError(msg) => AppError::Database(msg),
            ItlError::ConfigError(msg) => AppError::Internal(format!("Configuration error: {msg}")),
            ItlError::Io(err) => AppError::Internal(format!("I/O error: {err}")),
            ItlError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        // Status follows the underlying failure; the message keeps the step cursor
        let message = err.to_string();
        match err.root() {
            SyncError::Structural(_) => AppError::BadRequest(message),
            SyncError::Precondition(_) => AppError::Unprocessable(message),
            SyncError::Store(ItlError::NotFound(_)) => AppError::NotFound(message),
            // Payload validation happens before the store is touched
            SyncError::Store(ItlError::ValidationError(_) | ItlError::DatabaseError(_)) => {
                AppError::Database(message)
            }
            _ => AppError::Internal(message),
        }
    }
}
