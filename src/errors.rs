use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Submitted contribution value is not a positive amount.
    InvalidValue(String),
    /// Contribution is no longer in a state that allows the operation
    /// (e.g. a value was already assigned).
    InvalidState(String),
    /// Portal context does not own the contribution.
    Forbidden(String),
    /// Resource not found error.
    NotFound(String),
    /// Credential exchange with the invoicing provider failed.
    Authentication(String),
    /// Invoicing provider unreachable or timed out (retryable).
    ProviderUnavailable(String),
    /// Invoicing provider rejected an invoice-creation request.
    InvoiceCreation {
        /// HTTP status returned by the provider.
        status: u16,
        /// Provider error body.
        message: String,
    },
    /// Database-related errors.
    Database(sqlx::Error),
    /// Internal server error.
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            AppError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Authentication(msg) => write!(f, "Provider authentication failed: {}", msg),
            AppError::ProviderUnavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            AppError::InvoiceCreation { status, message } => {
                write!(f, "Invoice creation failed ({}): {}", status, message)
            }
            AppError::Database(e) => write!(f, "Database error: {}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and a
    /// `{"error": ...}` JSON body. Provider and database details are logged
    /// but not echoed back to the caller.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::InvalidValue(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Forbidden(msg) => {
                tracing::warn!("Forbidden portal access: {}", msg);
                (StatusCode::FORBIDDEN, "Forbidden".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Authentication(msg) => {
                tracing::error!("Lytex authentication failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Invoicing provider authentication failed".to_string(),
                )
            }
            AppError::ProviderUnavailable(msg) => {
                tracing::error!("Lytex unavailable: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Invoicing provider unavailable".to_string(),
                )
            }
            AppError::InvoiceCreation { status, message } => {
                tracing::error!("Lytex invoice creation failed ({}): {}", status, message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Invoice creation failed".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<reqwest::Error> for AppError {
    /// Converts a `reqwest::Error` into an `AppError`.
    ///
    /// Any transport-level failure (timeout, connect, body decode) means the
    /// provider call did not complete and is safe to retry.
    fn from(err: reqwest::Error) -> Self {
        AppError::ProviderUnavailable(err.to_string())
    }
}
