//! Error handling for the gateway.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Engine rejected or failed the request.
    #[error(transparent)]
    Engine(#[from] sieve_core::Error),
    /// Request is missing something the engine needs.
    #[error("{0}")]
    BadRequest(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error flag.
    pub error: bool,
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Engine(err) => StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Engine(err) => err.code(),
            AppError::BadRequest(_) => "BAD_REQUEST",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Datastore context names actors and raw parameters; keep it in the logs.
            AppError::Engine(err @ sieve_core::Error::Datastore { .. }) => {
                tracing::error!(error = %err, "request failed");
                "internal datastore error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: true,
            code: self.code().to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
