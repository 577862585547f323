//! Model metadata parsing
//!
//! Reads the parts of a Hugging Face config.json that change how a model
//! is fed: its architecture family and positional limit.

use crate::config::InferenceConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Model metadata extracted from config.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HfModelMetadata {
    /// Model architecture type (e.g., "bert", "distilbert", "roberta")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,

    /// Maximum sequence length
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_position_embeddings: Option<u32>,
}

/// Raw config.json structure (partial)
#[derive(Debug, Deserialize)]
struct RawConfig {
    model_type: Option<String>,
    max_position_embeddings: Option<u32>,
    // Some models use different names
    n_positions: Option<u32>,
}

/// Architectures whose exports take no `token_type_ids` input
const NO_TOKEN_TYPES: &[&str] = &[
    "distilbert",
    "roberta",
    "xlm-roberta",
    "camembert",
    "bart",
    "longformer",
    "mpnet",
];

/// Parse model metadata from a config.json file
///
/// Returns `None` if the file is missing or not valid JSON.
pub fn parse_model_config(config_path: &Path) -> Option<HfModelMetadata> {
    let content = std::fs::read_to_string(config_path).ok()?;
    let raw: RawConfig = serde_json::from_str(&content).ok()?;

    Some(HfModelMetadata {
        model_type: raw.model_type,
        max_position_embeddings: raw.max_position_embeddings.or(raw.n_positions),
    })
}

/// Whether the model expects segment ids next to input ids and mask
pub fn uses_token_type_ids(model_type: Option<&str>) -> bool {
    match model_type {
        Some(model_type) => !NO_TOKEN_TYPES.contains(&model_type.to_ascii_lowercase().as_str()),
        None => true,
    }
}

/// Shrink the window to what the model's position embeddings allow
pub fn fit_window(config: &InferenceConfig, meta: &HfModelMetadata) -> InferenceConfig {
    let mut fitted = config.clone();
    if let Some(limit) = meta.max_position_embeddings {
        let limit = limit as usize;
        if limit < fitted.max_seq_len {
            fitted.max_seq_len = limit;
            if fitted.doc_stride >= limit {
                fitted.doc_stride = limit / 4;
            }
        }
    }
    fitted
}
