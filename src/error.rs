use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Transport(String),

    #[error(
        "Could not read registry data automatically after {attempts} attempt(s). \
         Open {manual_url} in a browser, copy the table and paste it as notes."
    )]
    LookupExhausted { attempts: usize, manual_url: String },

    #[error("Capture failed: {0}. Fill in the fields manually or paste the text.")]
    CaptureFailed(String),

    #[error("OCR processing failed: {0}")]
    Processing(String),

    #[error("Failed to initialize OCR engine: {0}")]
    OcrInitialization(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP {0}")]
    Upstream(u16),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            LedgerError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            LedgerError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            LedgerError::Transport(_) => (StatusCode::BAD_GATEWAY, "TRANSPORT_ERROR"),
            LedgerError::LookupExhausted { .. } => (StatusCode::BAD_GATEWAY, "LOOKUP_EXHAUSTED"),
            LedgerError::CaptureFailed(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CAPTURE_FAILED"),
            LedgerError::Processing(_) => (StatusCode::UNPROCESSABLE_ENTITY, "PROCESSING_ERROR"),
            LedgerError::OcrInitialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INIT_ERROR"),
            LedgerError::UnsupportedFormat(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_FORMAT"),
            LedgerError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
            LedgerError::MissingFile => (StatusCode::BAD_REQUEST, "MISSING_FILE"),
            LedgerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            LedgerError::Upstream(code) => (
                StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY),
                "UPSTREAM_ERROR",
            ),
            LedgerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}
