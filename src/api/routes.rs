//! API route definitions

use crate::extract::DocumentExtractor;
use crate::models::ModelRegistry;
use crate::qa::QaService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;

/// Room for the non-file multipart fields on top of the upload limit
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub qa: QaService,
    pub extractor: Arc<DocumentExtractor>,
    pub prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<String>,
}

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(FORM_OVERHEAD_BYTES);
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        // Health and status
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Question answering
        .route("/api/models", get(handlers::list_models))
        .route("/api/qa", post(handlers::answer))
        .route("/api/upload", post(handlers::upload))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
}

/// CORS restricted to the configured origins; unparsable entries are skipped
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .allow_credentials(true)
}
