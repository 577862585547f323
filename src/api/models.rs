//! API request and response models

use crate::models::ModelDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub loaded_models: usize,
    pub device: String,
}

/// Service banner returned by `GET /`
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
    pub default_model: String,
}

/// Body of `POST /api/qa`
#[derive(Debug, Serialize, Deserialize)]
pub struct QaRequest {
    pub question: String,
    pub context: String,

    /// Catalog id or display name; absent uses the default model
    #[serde(default)]
    pub model_name: Option<String>,
}

/// One entry of `GET /api/models`
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub model_id: String,
    pub is_loaded: bool,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_used: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<ModelDescriptor> for ModelInfo {
    fn from(descriptor: ModelDescriptor) -> Self {
        Self {
            name: descriptor.name,
            model_id: descriptor.model_id,
            is_loaded: descriptor.is_loaded,
            description: descriptor.description,
            last_used: descriptor.last_used,
        }
    }
}

/// Catalog keyed by model id
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: BTreeMap<String, ModelInfo>,
    pub default_model: String,
}
