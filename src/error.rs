use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Counter store error: {0}")]
    CounterStore(#[from] redis::RedisError),

    #[error("Upstream request error: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Report not found or already processed")]
    ReportNotPending,

    #[error("Report not found")]
    ReportNotFound,

    #[error("Failed to decrypt stored address")]
    DecryptionFailed,

    #[error("External submission failed")]
    SubmissionFailed,

    #[error("Reporting endpoint is not configured")]
    ReportingDisabled,
}

/// Implement IntoResponse to convert AppError into HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::CounterStore(ref e) => {
                tracing::error!("Counter store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::Upstream(ref e) => {
                tracing::error!("Upstream request error: {:?}", e);
                (StatusCode::BAD_GATEWAY, "Upstream service unavailable")
            }
            AppError::Encryption(ref e) => {
                tracing::error!("Encryption error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::InvalidInput(ref msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::ReportNotPending => (
                StatusCode::CONFLICT,
                "Report not found or already processed",
            ),
            AppError::ReportNotFound => (StatusCode::NOT_FOUND, "Report not found"),
            AppError::DecryptionFailed => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Failed to decrypt stored address",
            ),
            AppError::SubmissionFailed => {
                (StatusCode::BAD_GATEWAY, "External submission failed")
            }
            AppError::ReportingDisabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Reporting endpoint is not configured",
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}

/// Result type alias for application results
pub type Result<T> = std::result::Result<T, AppError>;
