use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{models::GenerationFailure, services::quota_ledger::LedgerError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No file uploaded")]
    NoFileUploaded,

    #[error("File too large, the limit is {limit} bytes")]
    FileTooLarge { limit: usize },

    #[error("Only image files can be uploaded")]
    UnsupportedMediaType,

    #[error("Malformed upload: {0}")]
    Multipart(String),

    #[error("Invalid session id")]
    InvalidSession,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Generation(#[from] GenerationFailure),

    #[error("Quota ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NoFileUploaded => StatusCode::BAD_REQUEST,
            AppError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidSession => StatusCode::BAD_REQUEST,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Generation(failure) => match failure {
                GenerationFailure::ServiceDisabled => StatusCode::SERVICE_UNAVAILABLE,
                GenerationFailure::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
                GenerationFailure::NoUploadedFile => StatusCode::BAD_REQUEST,
                GenerationFailure::FileMissing
                | GenerationFailure::QuotaLedger(_)
                | GenerationFailure::GenerationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Details of storage and ledger failures stay in the logs
        let message = match self {
            AppError::Storage(ref msg) => {
                tracing::error!("Storage error: {}", msg);
                "Storage error".to_string()
            }
            AppError::Ledger(ref e) => {
                tracing::error!("Quota ledger error: {}", e);
                "Usage ledger unavailable".to_string()
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {:#}", e);
                "Internal server error".to_string()
            }
            ref other => other.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
