//! Configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub api_port: u16,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,

    /// Model used when a request does not name one. Must be in `models`.
    pub default_model: String,
    pub preload_default_model: bool,

    /// Hugging Face hub cache directory; `None` uses the hub default
    pub model_cache_dir: Option<PathBuf>,
    pub use_gpu: bool,

    /// Unload models idle for longer than this. Absent disables eviction.
    pub idle_eviction_secs: Option<u64>,
    pub eviction_interval_secs: u64,

    pub inference: InferenceConfig,
    pub extraction: ExtractionConfig,
    pub models: Vec<ModelSpec>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            cors_origins: default_cors_origins(),
            max_upload_bytes: default_max_upload_bytes(),
            default_model: default_model_id(),
            preload_default_model: true,
            model_cache_dir: None,
            use_gpu: true,
            idle_eviction_secs: None,
            eviction_interval_secs: default_eviction_interval_secs(),
            inference: InferenceConfig::default(),
            extraction: ExtractionConfig::default(),
            models: default_models(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(port) = std::env::var("QA_SERVER_PORT") {
            config.api_port = port.parse().context("Invalid QA_SERVER_PORT value")?;
        }
        if let Ok(model) = std::env::var("QA_DEFAULT_MODEL") {
            config.default_model = model;
        }
        if let Ok(dir) = std::env::var("QA_MODEL_CACHE_DIR") {
            config.model_cache_dir = Some(PathBuf::from(dir));
        }
        if let Ok(use_gpu) = std::env::var("QA_USE_GPU") {
            config.use_gpu = use_gpu.parse().context("Invalid QA_USE_GPU value")?;
        }
        if let Ok(limit) = std::env::var("QA_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = limit
                .parse()
                .context("Invalid QA_MAX_UPLOAD_BYTES value")?;
        }
        if let Ok(min_chars) = std::env::var("QA_OCR_MIN_CHARS") {
            config.extraction.min_text_chars = min_chars
                .parse()
                .context("Invalid QA_OCR_MIN_CHARS value")?;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_port < 1024 {
            anyhow::bail!("API port must be >= 1024 (got {})", self.api_port);
        }

        if self.models.is_empty() {
            anyhow::bail!("At least one model must be configured");
        }

        let mut ids = HashSet::new();
        for model in &self.models {
            if model.id.trim().is_empty() {
                anyhow::bail!("Model id cannot be empty");
            }
            if model.name.trim().is_empty() {
                anyhow::bail!("Model '{}' must have a display name", model.id);
            }
            if !ids.insert(model.id.as_str()) {
                anyhow::bail!("Duplicate model id: {}", model.id);
            }
        }

        if !ids.contains(self.default_model.as_str()) {
            anyhow::bail!(
                "Default model '{}' is not in the configured model list",
                self.default_model
            );
        }

        if self.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be greater than zero");
        }

        if self.idle_eviction_secs == Some(0) {
            anyhow::bail!("idle_eviction_secs must be greater than zero (omit it to disable)");
        }
        if self.eviction_interval_secs == 0 {
            anyhow::bail!("eviction_interval_secs must be greater than zero");
        }

        self.inference.validate()?;

        if self.extraction.render_dpi == 0 {
            anyhow::bail!("extraction.render_dpi must be greater than zero");
        }

        Ok(())
    }
}

/// Limits applied by span-extraction pipelines
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct InferenceConfig {
    /// Maximum tokens per model window (question + context + special tokens)
    pub max_seq_len: usize,
    /// Overlap in tokens between consecutive context windows
    pub doc_stride: usize,
    /// Longest answer span considered, in tokens
    pub max_answer_len: usize,
    /// Allow an empty answer when the model scores "no answer" highest
    pub handle_impossible_answer: bool,
    /// Threads per ONNX session
    pub intra_threads: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_seq_len: 512,
            doc_stride: 128,
            max_answer_len: 100,
            handle_impossible_answer: true,
            intra_threads: 2,
        }
    }
}

impl InferenceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_seq_len < 16 {
            anyhow::bail!("inference.max_seq_len must be >= 16 (got {})", self.max_seq_len);
        }
        if self.doc_stride >= self.max_seq_len {
            anyhow::bail!(
                "inference.doc_stride ({}) must be smaller than max_seq_len ({})",
                self.doc_stride,
                self.max_seq_len
            );
        }
        if self.max_answer_len == 0 {
            anyhow::bail!("inference.max_answer_len must be greater than zero");
        }
        if self.intra_threads == 0 {
            anyhow::bail!("inference.intra_threads must be greater than zero");
        }
        Ok(())
    }
}

/// Document-to-text policy
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Below this many non-whitespace characters a PDF is treated as scanned
    pub min_text_chars: usize,
    pub render_dpi: u32,
    pub ocr_enabled: bool,
    /// Tesseract language codes, joined with `+` (e.g. "eng+fra")
    pub ocr_lang: String,
    /// Directory holding `<lang>.traineddata`; otherwise libtesseract's
    /// default lookup (`TESSDATA_PREFIX`)
    pub tessdata_dir: Option<PathBuf>,
    /// Explicit PDFium library file; otherwise searched next to the binary
    /// and in system library paths
    pub pdfium_library: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 100,
            render_dpi: 300,
            ocr_enabled: true,
            ocr_lang: "eng".to_string(),
            tessdata_dir: None,
            pdfium_library: None,
        }
    }
}

/// A catalog entry for one question-answering model
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ModelSpec {
    /// Identifier used by API clients
    pub id: String,
    /// Display name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Hub repository holding the ONNX export, when different from `id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,

    /// Local directory with the model files; skips the hub entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// ONNX file inside the repository or directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onnx_file: Option<String>,
}

impl ModelSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            repo: None,
            path: None,
            onnx_file: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Repository to fetch from
    pub fn repo(&self) -> &str {
        self.repo.as_deref().unwrap_or(&self.id)
    }

    /// Configured description, or one derived from the architecture prefix
    /// of the identifier ("google/electra-small" -> "ELECTRA")
    pub fn description(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        let base = self.id.rsplit('/').next().unwrap_or(&self.id);
        let arch = base.split('-').next().unwrap_or(base).to_uppercase();
        format!("A QA model based on {}", arch)
    }
}

// Default functions
fn default_api_port() -> u16 {
    8000
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:8000".to_string(),
    ]
}
fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_model_id() -> String {
    "distilbert-base-uncased-distilled-squad".to_string()
}
fn default_eviction_interval_secs() -> u64 {
    60
}

fn default_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec::new("distilbert-base-uncased-distilled-squad", "DistilBERT (Fast)")
            .with_description(
                "A lightweight and fast model distilled from BERT. Good balance of speed and accuracy.",
            ),
        ModelSpec::new("deepset/roberta-base-squad2", "RoBERTa (Balanced)").with_description(
            "Based on RoBERTa, optimized for SQuAD 2.0. Handles unanswerable questions well.",
        ),
        ModelSpec::new(
            "bert-large-uncased-whole-word-masking-finetuned-squad",
            "BERT Large (Accurate)",
        )
        .with_description(
            "Large BERT model with whole word masking. High accuracy but slower inference.",
        ),
        ModelSpec::new("google/electra-small-discriminator", "ELECTRA Small (Lightweight)")
            .with_description(
                "Small and efficient ELECTRA model. Faster than BERT with comparable performance.",
            ),
    ]
}
