// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::ingest::batch::BatchReport;

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors raised while ingesting a single document.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The document is unusable. Skip it and report; never abort the batch.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A post was re-ingested claiming a different author than the stored one.
    /// The incoming document is quarantined for manual resolution.
    #[error(
        "identity conflict for post {keyword}#{post_number}: stored author {stored_author}, incoming author {incoming_author}"
    )]
    IdentityConflict {
        keyword: String,
        post_number: i64,
        stored_author: String,
        incoming_author: String,
    },

    /// The store could not complete the operation. Fatal for the current batch.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),
}

impl IngestError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::StoreUnavailable(_))
    }
}

/// A batch stopped early because the store failed.
/// Carries what was and was not committed before the failure.
#[derive(Debug, thiserror::Error)]
#[error("batch aborted after {} committed records: {cause}", .report.committed.len())]
pub struct BatchAborted {
    pub report: BatchReport,
    pub cause: String,
}

/// HTTP-facing error.
/// Centralizes mapping of domain errors to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // 500 Internal Server Error
    #[error("internal server error: {0}")]
    InternalServerError(String),

    // 400 Bad Request
    #[error("bad request: {0}")]
    BadRequest(String),

    // 404 Not Found
    #[error("not found: {0}")]
    NotFound(String),

    // 409 Conflict (identity conflict on re-ingestion)
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::MalformedRecord(_) => AppError::BadRequest(err.to_string()),
            IngestError::IdentityConflict { .. } => AppError::Conflict(err.to_string()),
            IngestError::StoreUnavailable(e) => AppError::InternalServerError(e.to_string()),
        }
    }
}

/// Allows using `?` operator on read queries inside handlers.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
