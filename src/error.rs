//! Error handling module
//!
//! Provides unified error types and handling for the entire application.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid proposal kind: {0}")]
    InvalidKind(String),

    #[error("Forum channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Thread or message not found: {0}")]
    ThreadOrMessageNotFound(String),

    #[error("Submission bridge failed: {0}")]
    ExternalBridge(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Chat platform error: {0}")]
    Platform(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Persistence(format!("Malformed JSON: {}", e))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Platform(e.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            AppError::InvalidKind(kind) => (
                StatusCode::BAD_REQUEST,
                "INVALID_KIND",
                format!("Invalid draft type: {} (expected budget or governance)", kind),
                None,
            ),
            AppError::ChannelNotFound(name) => {
                error!("Forum channel '{}' not found in guild", name);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "CHANNEL_NOT_FOUND",
                    format!(
                        "Unable to publish draft, forum channel not found. Verify a channel named '{}' exists",
                        name
                    ),
                    None,
                )
            }
            AppError::ThreadOrMessageNotFound(msg) => (
                StatusCode::NOT_FOUND,
                "THREAD_NOT_FOUND",
                msg.clone(),
                None,
            ),
            AppError::ExternalBridge(msg) => {
                error!("Submission bridge error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "BRIDGE_FAILED",
                    "The submission bridge failed".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Persistence(msg) => {
                error!("Persistence error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PERSISTENCE_ERROR",
                    "Failed to persist governance state".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Platform(msg) => {
                error!("Chat platform error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "PLATFORM_ERROR",
                    "The chat platform request failed".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                None,
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                None,
            ),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                msg.clone(),
                None,
            ),
            AppError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                msg.clone(),
                None,
            ),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "A configuration error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}

/// Helper function to create a not found error
pub fn not_found_error(msg: impl Into<String>) -> AppError {
    AppError::NotFound(msg.into())
}
