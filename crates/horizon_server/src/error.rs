use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Custom error types for the Horizon API
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid parameter: {field} - {message}")]
    ValidationError { field: String, message: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Input assembly error: {0}")]
    AssemblyError(String),

    #[error("Prediction error: {0}")]
    PredictionError(String),

    #[error("Mutex lock error")]
    LockError,
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::DatabaseError(err.to_string())
    }
}

impl From<horizon_core::AssembleError> for ApiError {
    fn from(err: horizon_core::AssembleError) -> Self {
        ApiError::AssemblyError(err.to_string())
    }
}

impl From<horizon_core::PredictionError> for ApiError {
    fn from(err: horizon_core::PredictionError) -> Self {
        ApiError::PredictionError(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ApiError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ApiError::LockError
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::ValidationError { .. } | ApiError::AssemblyError(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            ApiError::DatabaseError(_) => {
                tracing::error!("database error: {self}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal database error".to_string(),
                )
            }

            ApiError::PredictionError(_) => {
                tracing::error!("prediction error: {self}");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }

            ApiError::LockError => {
                tracing::error!("lock error: {self}");
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

/// Helper type for API results
pub type ApiResult<T> = Result<T, ApiError>;
