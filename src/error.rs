// Error types for the analytics core and the HTTP layer
// The core surfaces CoreError; handlers convert everything into AppError responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

// Failures the core reports to its caller. "No data" is not one of them:
// empty collections come back as LoadOutcome::Empty / Projection::Unavailable.
#[derive(Debug, Error)]
pub enum CoreError {
    // Response was valid JSON but not the expected shape (array vs object)
    #[error("malformed input: {0}")]
    MalformedInput(String),
    // Network-level failure on a fetch or on the progress channel
    #[error("transport failure: {0}")]
    TransportFailure(String),
}

impl From<reqwest::Error> for CoreError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            CoreError::MalformedInput(error.to_string())
        } else {
            CoreError::TransportFailure(error.to_string())
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(error: serde_json::Error) -> Self {
        CoreError::MalformedInput(error.to_string())
    }
}

// Application error type returned by the axum handlers
#[derive(Debug)]
pub enum AppError {
    InternalServerError(anyhow::Error),
    NotFound(String),
    Conflict(String), // e.g. an enrichment run is already in progress
    BadRequest(String),
}

// Implement conversion from anyhow::Error for easier error propagation
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::InternalServerError(error)
    }
}

impl From<CoreError> for AppError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::MalformedInput(message) => AppError::BadRequest(message),
            other => AppError::InternalServerError(anyhow::Error::new(other)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(e) => {
                // Log the detailed error here, don't expose internals to the client
                tracing::error!("Internal server error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::NotFound(message) => {
                tracing::info!("Not found: {}", message);
                (StatusCode::NOT_FOUND, message)
            }
            AppError::Conflict(message) => {
                tracing::warn!("Conflict: {}", message);
                (StatusCode::CONFLICT, message)
            }
            AppError::BadRequest(message) => {
                tracing::warn!("Bad request: {}", message);
                (StatusCode::BAD_REQUEST, message)
            }
        };

        (status, Json(json!({ "detail": error_message }))).into_response()
    }
}

// Define a custom Result type using our AppError
pub type AppResult<T> = Result<T, AppError>;
