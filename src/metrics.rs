//! Prometheus metrics

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;

/// Setup Prometheus metrics exporter
/// Returns a handle that can be used to retrieve metrics
pub fn setup_metrics() -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!("Prometheus metrics exporter installed");

    Ok(handle)
}

/// Record a successfully answered question
pub fn record_answer(model_id: &str, elapsed: Duration) {
    metrics::counter!("qa_answers_total",
        "model" => model_id.to_string()
    )
    .increment(1);
    metrics::histogram!("qa_inference_seconds",
        "model" => model_id.to_string()
    )
    .record(elapsed.as_secs_f64());
}

/// Record a pipeline load
pub fn record_model_loaded(model_id: &str, elapsed: Duration) {
    metrics::counter!("qa_model_loads_total",
        "model" => model_id.to_string()
    )
    .increment(1);
    metrics::histogram!("qa_model_load_seconds",
        "model" => model_id.to_string()
    )
    .record(elapsed.as_secs_f64());
}

/// Record a failed pipeline load
pub fn record_model_load_failure(model_id: &str) {
    metrics::counter!("qa_model_load_failures_total",
        "model" => model_id.to_string()
    )
    .increment(1);
}

/// Record an idle eviction
pub fn record_model_evicted(model_id: &str) {
    metrics::counter!("qa_model_evictions_total",
        "model" => model_id.to_string()
    )
    .increment(1);
}

/// Record a document that needed the OCR fallback
pub fn record_ocr_fallback(pages: usize) {
    metrics::counter!("qa_ocr_fallbacks_total").increment(1);
    metrics::counter!("qa_ocr_pages_total").increment(pages as u64);
}

/// Record an error response by kind
pub fn record_api_error(code: &'static str) {
    metrics::counter!("qa_api_errors_total",
        "code" => code
    )
    .increment(1);
}

/// Update loaded model gauge
pub fn update_loaded_models(count: usize) {
    metrics::gauge!("qa_loaded_models").set(count as f64);
}
