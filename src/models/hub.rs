//! Model file resolution
//!
//! Fetches the ONNX export, tokenizer and config of a catalog entry from the
//! Hugging Face hub (through the standard hub cache), or locates them in a
//! local directory.

use super::loader::LoadError;
use crate::config::ModelSpec;
use hf_hub::api::tokio::{Api, ApiBuilder, ApiRepo};
use std::path::{Path, PathBuf};

/// Where ONNX exports usually live inside a repository, in lookup order
const ONNX_CANDIDATES: &[&str] = &["onnx/model.onnx", "model.onnx"];

/// Files needed to instantiate a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub model: PathBuf,
    pub tokenizer: PathBuf,
    /// config.json, when the repository ships one
    pub config: Option<PathBuf>,
}

/// Download (or reuse from cache) everything a model needs
pub async fn fetch_model_files(
    spec: &ModelSpec,
    cache_dir: Option<PathBuf>,
) -> Result<ModelFiles, LoadError> {
    let repo_id = spec.repo();
    tracing::info!(model_id = %spec.id, repo = %repo_id, cache_dir = ?cache_dir, "Resolving model files via hf-hub");

    let api = match cache_dir {
        Some(dir) => ApiBuilder::new()
            .with_cache_dir(dir)
            .build()
            .map_err(|e| LoadError::Runtime(format!("Failed to create HF API client: {}", e)))?,
        None => Api::new()
            .map_err(|e| LoadError::Runtime(format!("Failed to create HF API client: {}", e)))?,
    };
    let repo = api.model(repo_id.to_string());

    let tokenizer = get_file(&repo, "tokenizer.json").await?;

    let config = match repo.get("config.json").await {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::debug!(repo = %repo_id, error = %e, "No config.json, using defaults");
            None
        }
    };

    let model = match spec.onnx_file.as_deref() {
        Some(file) => get_file(&repo, file).await?,
        None => find_onnx_export(&repo, repo_id).await?,
    };

    Ok(ModelFiles {
        model,
        tokenizer,
        config,
    })
}

async fn get_file(repo: &ApiRepo, file: &str) -> Result<PathBuf, LoadError> {
    tracing::debug!(file = %file, "Downloading file");
    repo.get(file).await.map_err(|e| LoadError::Download {
        file: file.to_string(),
        reason: e.to_string(),
    })
}

async fn find_onnx_export(repo: &ApiRepo, repo_id: &str) -> Result<PathBuf, LoadError> {
    for file in ONNX_CANDIDATES {
        match repo.get(file).await {
            Ok(path) => {
                tracing::debug!(repo = %repo_id, file = %file, "Found ONNX export");
                return Ok(path);
            }
            Err(e) => tracing::debug!(repo = %repo_id, file = %file, error = %e, "Not found"),
        }
    }

    Err(LoadError::Unsupported(format!(
        "{} has no ONNX export (looked for {})",
        repo_id,
        ONNX_CANDIDATES.join(", ")
    )))
}

/// Locate model files in a local directory
pub fn local_model_files(dir: &Path, onnx_file: Option<&str>) -> Result<ModelFiles, LoadError> {
    let model = match onnx_file {
        Some(file) => require(dir.join(file))?,
        None => ONNX_CANDIDATES
            .iter()
            .map(|file| dir.join(file))
            .find(|path| path.is_file())
            .ok_or_else(|| LoadError::MissingFile(dir.join(ONNX_CANDIDATES[1])))?,
    };
    let tokenizer = require(dir.join("tokenizer.json"))?;
    let config = Some(dir.join("config.json")).filter(|path| path.is_file());

    Ok(ModelFiles {
        model,
        tokenizer,
        config,
    })
}

fn require(path: PathBuf) -> Result<PathBuf, LoadError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(LoadError::MissingFile(path))
    }
}
