//! Error types for the user API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::store::StoreError;
use crate::users::validation::ValidationErrors;

/// Errors surfaced by the user endpoints. Every variant renders as an error
/// envelope; none of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthenticated.")]
    Unauthenticated,

    #[error("This action is unauthorized.")]
    Forbidden,

    #[error("Resource not found.")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("The given data was invalid.")]
    ValidationFailed(ValidationErrors),

    /// A destructive operation was refused by a hard-coded rule.
    #[error("{0}")]
    GuardViolation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::GuardViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            ApiError::ValidationFailed(errors) => json!({
                "status": "error",
                "message": self.to_string(),
                "errors": errors,
            }),
            ApiError::Storage(e) => {
                tracing::error!("Storage failure while handling request: {}", e);
                json!({
                    "status": "error",
                    "message": "Internal server error",
                })
            }
            _ => json!({
                "status": "error",
                "message": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
