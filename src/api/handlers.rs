//! API request handlers

use super::models::{HealthResponse, ModelInfo, ModelsResponse, QaRequest, ServiceInfo};
use super::routes::AppState;
use crate::error::{QaError, QaResult};
use crate::qa::InferenceResult;
use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
};

/// GET /health - Service health check
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now(),
            loaded_models: state.registry.loaded_count(),
            device: state.registry.device().to_string(),
        }),
    )
}

/// GET / - Service banner
pub async fn root(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "Question answering API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        default_model: state.registry.default_model().to_string(),
    })
}

/// GET /metrics - Prometheus metrics
pub async fn metrics(State(state): State<AppState>) -> String {
    state.prometheus_handle.render()
}

/// GET /api/models - Catalog with load state
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let descriptors = state.registry.list().await;

    crate::metrics::update_loaded_models(state.registry.loaded_count());

    let models = descriptors
        .into_iter()
        .map(|descriptor| (descriptor.model_id.clone(), ModelInfo::from(descriptor)))
        .collect();

    Json(ModelsResponse {
        models,
        default_model: state.registry.default_model().to_string(),
    })
}

/// POST /api/qa - Answer a question from the supplied context
pub async fn answer(
    State(state): State<AppState>,
    payload: Result<Json<QaRequest>, JsonRejection>,
) -> QaResult<Json<InferenceResult>> {
    let Json(req) = payload.map_err(|rejection| QaError::InvalidInput(rejection.body_text()))?;

    let result = state
        .qa
        .answer(&req.question, &req.context, req.model_name.as_deref())
        .await?;

    Ok(Json(result))
}

/// A file received through multipart upload
struct UploadedFile {
    bytes: Bytes,
    filename: Option<String>,
    content_type: Option<String>,
}

/// POST /api/upload - Extract a document's text and answer from it
///
/// Form fields: `file` (PDF or plain text), `question`, optional `model_name`.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> QaResult<Json<InferenceResult>> {
    let mut multipart =
        multipart.map_err(|rejection| QaError::InvalidInput(rejection.body_text()))?;
    let limit = state.max_upload_bytes;

    let mut file = None;
    let mut question = None;
    let mut model_name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                file = Some(UploadedFile {
                    bytes,
                    filename,
                    content_type,
                });
            }
            "question" => {
                question = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            "model_name" => {
                let value = field.text().await.map_err(|e| multipart_error(e, limit))?;
                if !value.trim().is_empty() {
                    model_name = Some(value);
                }
            }
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    let file = file.ok_or_else(|| QaError::InvalidInput("No file provided".to_string()))?;
    let question =
        question.ok_or_else(|| QaError::InvalidInput("Question cannot be empty".to_string()))?;

    if file.bytes.len() > limit {
        return Err(payload_too_large(limit));
    }

    tracing::info!(
        filename = ?file.filename,
        content_type = ?file.content_type,
        size = file.bytes.len(),
        "Processing uploaded document"
    );

    let extractor = state.extractor.clone();
    let document = tokio::task::spawn_blocking(move || {
        extractor.extract_upload(
            &file.bytes,
            file.content_type.as_deref(),
            file.filename.as_deref(),
        )
    })
    .await
    .map_err(|e| anyhow::anyhow!("extraction task failed: {e}"))??;

    tracing::info!(
        method = ?document.method,
        pages = document.page_count,
        chars = document.text.len(),
        "Document text extracted"
    );

    if document.text.trim().is_empty() {
        return Err(QaError::InvalidInput(
            "No text could be extracted from the document".to_string(),
        ));
    }

    let result = state
        .qa
        .answer(&question, &document.text, model_name.as_deref())
        .await?;

    Ok(Json(result))
}

fn payload_too_large(limit: usize) -> QaError {
    QaError::PayloadTooLarge {
        limit_mb: limit as f64 / (1024.0 * 1024.0),
    }
}

/// Body limit hits surface as 413, anything else as a malformed form
fn multipart_error(err: MultipartError, limit: usize) -> QaError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        payload_too_large(limit)
    } else {
        QaError::InvalidInput(format!("Invalid multipart form: {}", err.body_text()))
    }
}
