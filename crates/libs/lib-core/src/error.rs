//! # Centralized Error Handling
//!
//! This module defines the application-wide error type [`AppError`] used across
//! the messaging crates. It follows the `thiserror` pattern for ergonomic error handling.
//!
//! ## Error Categories
//!
//! 1. **Caller Errors** (4xx) - returned to the specific caller only
//!    - [`Authentication`](AppError::Authentication) → 401 Unauthorized
//!    - [`Authorization`](AppError::Authorization) → 403 Forbidden
//!    - [`NotFound`](AppError::NotFound) → 404 Not Found
//!    - [`Validation`](AppError::Validation) → 400 Bad Request
//!    - [`Decoding`](AppError::Decoding) → 400 Bad Request
//!
//! 2. **Server Errors** (5xx)
//!    - [`Persistence`](AppError::Persistence) → 503 Service Unavailable
//!    - [`Config`](AppError::Config) / [`Internal`](AppError::Internal) → 500
//!
//! ## Usage Example
//!
//! ```rust
//! use lib_core::error::{AppError, Result};
//!
//! fn require_content(content: &str) -> Result<()> {
//!     if content.trim().is_empty() {
//!         return Err(AppError::Validation("content cannot be empty".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;
use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

/// Convenience type alias for `Result<T, AppError>`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application-wide error type covering all error scenarios.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, invalid or expired credential.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Actor is not a participant of the conversation.
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Unknown conversation, message, listing or participant.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or malformed required fields.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store unavailable or write failure.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration error during startup or environment loading.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload could not be decoded (JSON frames, collaborator responses).
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Internal server error (unexpected failures).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::Decoding(_) => StatusCode::BAD_REQUEST,
            AppError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code, also sent next to the reason on the live channel.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Authentication(_) => "Authentication",
            AppError::Authorization(_) => "Authorization",
            AppError::NotFound(_) => "NotFound",
            AppError::Validation(_) => "Validation",
            AppError::Persistence(_) => "Persistence",
            AppError::Config(_) => "Config",
            AppError::Decoding(_) => "Decoding",
            AppError::Internal(_) => "Internal",
        }
    }

    /// Get a user-friendly error message.
    ///
    /// Store and internal failures return a generic message so implementation
    /// details stay in the server log.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Decoding(msg) => msg.clone(),
            AppError::Persistence(_) => "Message store unavailable, please retry".to_string(),
            AppError::Config(_) | AppError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// True when the caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Persistence(_))
    }
}

/// Implement Axum's `IntoResponse` for automatic error handling.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("Server error: {}", self);
        } else {
            tracing::debug!("Client error: {}", self);
        }

        let body = Json(json!({
            "error": self.user_message(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Convert `sqlx::Error` to `AppError`.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Database record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                AppError::Persistence(format!("Database error: {}", db_err.message()))
            }
            _ => AppError::Persistence(format!("Database error: {}", err)),
        }
    }
}

/// Convert `serde_json::Error` to `AppError`.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decoding(format!("JSON error: {}", err))
    }
}
