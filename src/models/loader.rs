//! Pipeline instantiation
//!
//! Turns a catalog entry into a ready-to-run [`QaPipeline`]. The registry
//! only sees the [`PipelineLoader`] trait, so tests and embedders can supply
//! their own pipelines.

use crate::config::ModelSpec;
use crate::device::ComputeDevice;
use crate::pipeline::QaPipeline;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[cfg(feature = "onnx")]
pub use onnx_loader::OnnxLoader;

/// Failures while instantiating a pipeline
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to download {file}: {reason}")]
    Download { file: String, reason: String },

    #[error("model file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("runtime initialisation failed: {0}")]
    Runtime(String),

    #[error("tokenizer load failed: {0}")]
    Tokenizer(String),

    /// The repository has no usable export for this runtime
    #[error("unsupported model: {0}")]
    Unsupported(String),
}

/// Creates pipelines for catalog entries
#[async_trait]
pub trait PipelineLoader: Send + Sync {
    async fn load(
        &self,
        spec: &ModelSpec,
        device: ComputeDevice,
    ) -> Result<Arc<dyn QaPipeline>, LoadError>;
}

#[cfg(feature = "onnx")]
mod onnx_loader {
    use super::*;
    use crate::config::InferenceConfig;
    use crate::models::{hub, metadata};
    use crate::pipeline::{InferenceError, OnnxQaPipeline};

    /// Loads ONNX exports from a local directory or the Hugging Face hub
    pub struct OnnxLoader {
        cache_dir: Option<PathBuf>,
        inference: InferenceConfig,
    }

    impl OnnxLoader {
        pub fn new(cache_dir: Option<PathBuf>, inference: InferenceConfig) -> Self {
            Self {
                cache_dir,
                inference,
            }
        }
    }

    #[async_trait]
    impl PipelineLoader for OnnxLoader {
        async fn load(
            &self,
            spec: &ModelSpec,
            device: ComputeDevice,
        ) -> Result<Arc<dyn QaPipeline>, LoadError> {
            let files = match &spec.path {
                Some(dir) => hub::local_model_files(dir, spec.onnx_file.as_deref())?,
                None => hub::fetch_model_files(spec, self.cache_dir.clone()).await?,
            };

            let meta = files
                .config
                .as_deref()
                .and_then(metadata::parse_model_config)
                .unwrap_or_default();
            let use_token_type_ids = metadata::uses_token_type_ids(meta.model_type.as_deref());
            let inference = metadata::fit_window(&self.inference, &meta);

            tracing::debug!(
                model_id = %spec.id,
                model_type = ?meta.model_type,
                max_seq_len = inference.max_seq_len,
                "Instantiating ONNX pipeline"
            );

            let pipeline = tokio::task::spawn_blocking(move || {
                OnnxQaPipeline::load(
                    &files.model,
                    &files.tokenizer,
                    use_token_type_ids,
                    device,
                    &inference,
                )
            })
            .await
            .map_err(|e| LoadError::Runtime(format!("load task failed: {e}")))?
            .map_err(|e| match e {
                InferenceError::Tokenization(msg) => LoadError::Tokenizer(msg),
                other => LoadError::Runtime(other.to_string()),
            })?;

            Ok(Arc::new(pipeline))
        }
    }
}
