//! Service error taxonomy and its HTTP mapping

use crate::extract::ExtractError;
use crate::models::LoadError;
use crate::pipeline::InferenceError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the QA service and the HTTP layer
#[derive(Debug, Error)]
pub enum QaError {
    /// Bad request shape or empty fields
    #[error("{0}")]
    InvalidInput(String),

    /// Model identifier (or display name) not present in the catalog
    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    /// Upload is neither a PDF nor plain text
    #[error("Unsupported file type: {0}. Allowed types: .pdf, .txt")]
    UnsupportedFormat(String),

    /// Upload exceeds the configured size limit
    #[error("File too large. Maximum size: {limit_mb:.1}MB")]
    PayloadTooLarge { limit_mb: f64 },

    /// Weights or runtime failed while instantiating a pipeline
    #[error("Failed to load model {model_id}: {source}")]
    ModelLoad {
        model_id: String,
        #[source]
        source: LoadError,
    },

    /// The loaded pipeline rejected the input or failed while running
    #[error("Failed to get answer from {model_id}: {source}")]
    Inference {
        model_id: String,
        #[source]
        source: InferenceError,
    },

    /// Document could not be turned into text (corrupt PDF, OCR failure)
    #[error("Failed to extract text from document: {0}")]
    Extraction(#[source] ExtractError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type QaResult<T> = Result<T, QaError>;

impl QaError {
    /// Stable machine-readable error kind, also used as a metrics label
    pub fn code(&self) -> &'static str {
        match self {
            QaError::InvalidInput(_) => "invalid_input",
            QaError::UnknownModel(_) => "unknown_model",
            QaError::UnsupportedFormat(_) => "unsupported_format",
            QaError::PayloadTooLarge { .. } => "payload_too_large",
            QaError::ModelLoad { .. } => "model_load_error",
            QaError::Inference { .. } => "inference_error",
            QaError::Extraction(_) => "extraction_error",
            QaError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            QaError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            QaError::UnknownModel(_) => StatusCode::NOT_FOUND,
            QaError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            QaError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            QaError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            QaError::ModelLoad { .. } | QaError::Inference { .. } | QaError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ExtractError> for QaError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::UnsupportedFormat(kind) => QaError::UnsupportedFormat(kind),
            other => QaError::Extraction(other),
        }
    }
}

impl IntoResponse for QaError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        crate::metrics::record_api_error(code);

        let message = match &self {
            QaError::Internal(err) => {
                tracing::error!(error = ?err, "Unhandled internal error");
                "An unexpected error occurred. Please try again later.".to_string()
            }
            QaError::ModelLoad { .. } | QaError::Inference { .. } => {
                tracing::error!(error = %self, code, "Model failure");
                self.to_string()
            }
            _ => {
                tracing::warn!(error = %self, code, "Request rejected");
                self.to_string()
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code,
            timestamp: chrono::Utc::now(),
        });

        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
}
