//! Integration tests that run the API in-process
//!
//! Handlers are exercised through axum-test against the real router. A stub
//! pipeline loader stands in for model weights, and mock renderer/OCR
//! components stand in for PDFium and tesseract.

use async_trait::async_trait;
use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use lopdf::{Document, Object, Stream, dictionary};
use qa_server::{
    api::routes::{AppState, create_router},
    config::{ExtractionConfig, ModelSpec},
    device::ComputeDevice,
    extract::{DocumentExtractor, LopdfTextSource, MockOcrEngine, MockPageRenderer},
    metrics,
    models::{LoadError, ModelRegistry, PipelineLoader},
    pipeline::{InferenceError, QaPipeline, SpanAnswer},
    qa::QaService,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

// Global metrics handle - only initialize once per test process
static METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> metrics_exporter_prometheus::PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| metrics::setup_metrics().expect("Failed to setup metrics"))
        .clone()
}

/// Answers with the first word of the context, without trailing punctuation
struct FirstWord;

impl QaPipeline for FirstWord {
    fn infer(&self, _question: &str, context: &str) -> Result<SpanAnswer, InferenceError> {
        let start = context.len() - context.trim_start().len();
        let word_len = context[start..]
            .find(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .unwrap_or(context.len() - start);
        Ok(SpanAnswer {
            answer: context[start..start + word_len].to_string(),
            score: 0.87,
            start,
            end: start + word_len,
        })
    }
}

/// Stub loader; "broken-qa" always fails to load
#[derive(Default)]
struct StubLoader {
    loads: AtomicUsize,
}

#[async_trait]
impl PipelineLoader for StubLoader {
    async fn load(
        &self,
        spec: &ModelSpec,
        _device: ComputeDevice,
    ) -> Result<Arc<dyn QaPipeline>, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if spec.id == "broken-qa" {
            return Err(LoadError::Runtime("weights are corrupt".to_string()));
        }
        Ok(Arc::new(FirstWord))
    }
}

const MAX_UPLOAD_BYTES: usize = 4 * 1024;

const OCR_TEXT: &str = "Berlin is the capital of Germany and its largest city. \
                        The scanned page talks about its history at some length.";

/// Helper to create a test server with the API
fn create_test_server() -> (TestServer, Arc<StubLoader>) {
    let loader = Arc::new(StubLoader::default());
    let registry = Arc::new(
        ModelRegistry::with_models(
            vec![
                ModelSpec::new("distilbert-qa", "DistilBERT")
                    .with_description("Small distilled model"),
                ModelSpec::new("roberta-qa", "RoBERTa"),
                ModelSpec::new("broken-qa", "Broken"),
            ],
            "distilbert-qa".to_string(),
            loader.clone(),
            ComputeDevice::Cpu,
        )
        .expect("Failed to build registry"),
    );

    let extractor = DocumentExtractor::with_components(
        ExtractionConfig::default(),
        Arc::new(LopdfTextSource),
        Some(Arc::new(MockPageRenderer::new(1))),
        Some(Arc::new(MockOcrEngine::new(OCR_TEXT))),
    );

    let state = AppState {
        registry: registry.clone(),
        qa: QaService::new(registry),
        extractor: Arc::new(extractor),
        prometheus_handle: get_metrics_handle(),
        max_upload_bytes: MAX_UPLOAD_BYTES,
        cors_origins: vec!["http://localhost:3000".to_string()],
    };

    let app = create_router(state);
    let server = TestServer::try_new(app).expect("Failed to create test server");

    (server, loader)
}

/// Single-page PDF with no text layer, like a scanned document
fn scanned_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("Failed to write PDF");
    buf
}

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _loader) = create_test_server();

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
    assert_eq!(body["loaded_models"], 0);
    assert_eq!(body["device"], "cpu");
}

#[tokio::test]
async fn test_root_endpoint() {
    let (server, _loader) = create_test_server();

    let response = server.get("/").await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["default_model"], "distilbert-qa");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (server, _loader) = create_test_server();

    let response = server.get("/metrics").await;

    assert_eq!(response.status_code(), 200);
    let _text = response.text();
}

#[tokio::test]
async fn test_list_models_initially_unloaded() {
    let (server, loader) = create_test_server();

    let response = server.get("/api/models").await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["default_model"], "distilbert-qa");

    let models = body["models"].as_object().unwrap();
    assert_eq!(models.len(), 3);
    for (id, info) in models {
        assert_eq!(info["model_id"], *id);
        assert_eq!(info["is_loaded"], false);
        assert!(info.get("last_used").is_none());
    }
    assert_eq!(models["distilbert-qa"]["name"], "DistilBERT");
    assert_eq!(
        models["distilbert-qa"]["description"],
        "Small distilled model"
    );
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_answer_uses_default_model() {
    let (server, _loader) = create_test_server();

    let response = server
        .post("/api/qa")
        .json(&json!({
            "question": "What is the capital of France?",
            "context": "Paris is the capital of France."
        }))
        .await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["answer"], "Paris");
    assert_eq!(body["model_used"], "distilbert-qa");
    assert_eq!(body["context"], "Paris is the capital of France.");

    let confidence = body["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    assert!(body["processing_time"].as_f64().unwrap() >= 0.0);

    // The model is now reported as loaded with a last-used time
    let models: serde_json::Value = server.get("/api/models").await.json();
    assert_eq!(models["models"]["distilbert-qa"]["is_loaded"], true);
    assert!(models["models"]["distilbert-qa"]["last_used"].is_string());
    assert_eq!(models["models"]["roberta-qa"]["is_loaded"], false);
}

#[tokio::test]
async fn test_answer_with_model_display_name() {
    let (server, _loader) = create_test_server();

    let response = server
        .post("/api/qa")
        .json(&json!({
            "question": "Who?",
            "context": "Marie Curie won two Nobel prizes.",
            "model_name": "roberta"
        }))
        .await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["model_used"], "roberta-qa");
    assert_eq!(body["answer"], "Marie");
}

#[tokio::test]
async fn test_unknown_model_is_not_found_and_never_loads() {
    let (server, loader) = create_test_server();

    let response = server
        .post("/api/qa")
        .json(&json!({
            "question": "What?",
            "context": "Something.",
            "model_name": "no-such-model"
        }))
        .await;

    assert_eq!(response.status_code(), 404);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "unknown_model");
    assert!(body["error"].as_str().unwrap().contains("no-such-model"));
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_question_is_bad_request() {
    let (server, loader) = create_test_server();

    let response = server
        .post("/api/qa")
        .json(&json!({ "question": "   ", "context": "Some context." }))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "invalid_input");
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (server, _loader) = create_test_server();

    let response = server
        .post("/api/qa")
        .json(&json!({ "question": "Missing context" }))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "invalid_input");
}

#[tokio::test]
async fn test_model_load_failure_is_server_error() {
    let (server, _loader) = create_test_server();

    let response = server
        .post("/api/qa")
        .json(&json!({
            "question": "What?",
            "context": "Something.",
            "model_name": "broken-qa"
        }))
        .await;

    assert_eq!(response.status_code(), 500);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "model_load_error");
    assert!(body["error"].as_str().unwrap().contains("weights are corrupt"));

    let models: serde_json::Value = server.get("/api/models").await.json();
    assert_eq!(models["models"]["broken-qa"]["is_loaded"], false);
}

#[tokio::test]
async fn test_upload_plain_text() {
    let (server, _loader) = create_test_server();

    let form = MultipartForm::new()
        .add_text("question", "What is the capital of France?")
        .add_part(
            "file",
            Part::bytes(b"Paris is the capital of France.".to_vec())
                .file_name("france.txt")
                .mime_type("text/plain"),
        );

    let response = server.post("/api/upload").multipart(form).await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["answer"], "Paris");
    assert_eq!(body["model_used"], "distilbert-qa");
    assert!(body["context"].as_str().unwrap().contains("Paris"));
}

#[tokio::test]
async fn test_upload_scanned_pdf_uses_ocr() {
    let (server, _loader) = create_test_server();

    let form = MultipartForm::new()
        .add_text("question", "What is the capital of Germany?")
        .add_text("model_name", "roberta-qa")
        .add_part(
            "file",
            Part::bytes(scanned_pdf())
                .file_name("scan.pdf")
                .mime_type("application/pdf"),
        );

    let response = server.post("/api/upload").multipart(form).await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["answer"], "Berlin");
    assert_eq!(body["model_used"], "roberta-qa");
    assert!(body["context"].as_str().unwrap().starts_with("Berlin is the capital"));
}

#[tokio::test]
async fn test_upload_unsupported_type() {
    let (server, loader) = create_test_server();

    let form = MultipartForm::new()
        .add_text("question", "What is this?")
        .add_part(
            "file",
            Part::bytes(b"\x89PNG\r\n\x1a\n".to_vec())
                .file_name("picture.png")
                .mime_type("image/png"),
        );

    let response = server.post("/api/upload").multipart(form).await;

    assert_eq!(response.status_code(), 415);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "unsupported_format");
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_upload_too_large() {
    let (server, _loader) = create_test_server();

    let form = MultipartForm::new()
        .add_text("question", "What?")
        .add_part(
            "file",
            Part::bytes(vec![b'a'; MAX_UPLOAD_BYTES + 1])
                .file_name("big.txt")
                .mime_type("text/plain"),
        );

    let response = server.post("/api/upload").multipart(form).await;

    assert_eq!(response.status_code(), 413);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "payload_too_large");
}

#[tokio::test]
async fn test_upload_without_file() {
    let (server, _loader) = create_test_server();

    let form = MultipartForm::new().add_text("question", "What?");

    let response = server.post("/api/upload").multipart(form).await;

    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_upload_corrupt_pdf() {
    let (server, _loader) = create_test_server();

    let form = MultipartForm::new()
        .add_text("question", "What?")
        .add_part(
            "file",
            Part::bytes(b"%PDF-1.4 this is not really a pdf".to_vec())
                .file_name("broken.pdf")
                .mime_type("application/pdf"),
        );

    let response = server.post("/api/upload").multipart(form).await;

    assert_eq!(response.status_code(), 422);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "extraction_error");
}

#[tokio::test]
async fn test_upload_requires_multipart_body() {
    let (server, _loader) = create_test_server();

    let response = server
        .post("/api/upload")
        .json(&json!({ "question": "What?", "file": "not a form" }))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "invalid_input");
}
