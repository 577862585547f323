//! Model registry: the catalog of known models plus their loaded pipelines

use super::cache::{EvictionPolicy, PipelineCache, PipelineLease};
use super::loader::PipelineLoader;
use crate::config::{ModelSpec, ServerConfig};
use crate::device::ComputeDevice;
use crate::error::{QaError, QaResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Public view of one catalog entry
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelDescriptor {
    pub model_id: String,
    pub name: String,
    pub description: String,
    pub is_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

/// Catalog of question-answering models with lazy loading
///
/// Built once at startup from configuration and shared by the QA service,
/// the HTTP layer and the idle evictor. Nothing is persisted; a restart
/// starts with every model unloaded.
pub struct ModelRegistry {
    specs: Vec<ModelSpec>,
    default_model: String,
    cache: PipelineCache,
    loader: Arc<dyn PipelineLoader>,
    device: ComputeDevice,
}

impl ModelRegistry {
    /// Populate descriptors from configuration
    pub fn new(
        config: &ServerConfig,
        loader: Arc<dyn PipelineLoader>,
        device: ComputeDevice,
    ) -> anyhow::Result<Self> {
        Self::with_models(
            config.models.clone(),
            config.default_model.clone(),
            loader,
            device,
        )
    }

    pub fn with_models(
        specs: Vec<ModelSpec>,
        default_model: String,
        loader: Arc<dyn PipelineLoader>,
        device: ComputeDevice,
    ) -> anyhow::Result<Self> {
        if !specs.iter().any(|spec| spec.id == default_model) {
            anyhow::bail!("Default model '{}' is not registered", default_model);
        }

        let cache = PipelineCache::new(specs.iter().map(|spec| spec.id.clone()));

        tracing::info!(
            models = specs.len(),
            default_model = %default_model,
            device = %device,
            "Model registry initialised"
        );

        Ok(Self {
            specs,
            default_model,
            cache,
            loader,
            device,
        })
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    pub fn spec(&self, model_id: &str) -> Option<&ModelSpec> {
        self.specs.iter().find(|spec| spec.id == model_id)
    }

    pub fn is_loaded(&self, model_id: &str) -> bool {
        self.cache.is_loaded(model_id)
    }

    pub fn loaded_count(&self) -> usize {
        self.cache.loaded_count()
    }

    /// Every catalog entry, in configuration order
    pub async fn list(&self) -> Vec<ModelDescriptor> {
        let mut descriptors = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            let usage = self.cache.usage(&spec.id).await;
            descriptors.push(ModelDescriptor {
                model_id: spec.id.clone(),
                name: spec.name.clone(),
                description: spec.description(),
                is_loaded: usage.is_some_and(|u| u.is_loaded),
                last_used: usage.and_then(|u| u.last_used),
            });
        }
        descriptors
    }

    /// Map a requested model to its catalog id
    ///
    /// `None` or a blank name selects the default. Ids match exactly; display
    /// names match ignoring case.
    pub fn resolve(&self, requested: Option<&str>) -> QaResult<&str> {
        let requested = match requested.map(str::trim) {
            None | Some("") => return Ok(self.default_model.as_str()),
            Some(name) => name,
        };

        self.specs
            .iter()
            .find(|spec| spec.id == requested)
            .or_else(|| {
                self.specs
                    .iter()
                    .find(|spec| spec.name.eq_ignore_ascii_case(requested))
            })
            .map(|spec| spec.id.as_str())
            .ok_or_else(|| QaError::UnknownModel(requested.to_string()))
    }

    /// Load the pipeline for `model_id` if it is not loaded yet
    pub async fn ensure_loaded(&self, model_id: &str) -> QaResult<()> {
        let spec = self
            .spec(model_id)
            .ok_or_else(|| QaError::UnknownModel(model_id.to_string()))?;

        let started = Instant::now();
        let outcome = self
            .cache
            .get_or_load(model_id, || async {
                tracing::info!(model_id = %model_id, device = %self.device, "Loading model");
                self.loader.load(spec, self.device).await
            })
            .await;

        match outcome {
            Ok(Some(true)) => {
                let elapsed = started.elapsed();
                tracing::info!(
                    model_id = %model_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Model loaded"
                );
                crate::metrics::record_model_loaded(model_id, elapsed);
                crate::metrics::update_loaded_models(self.cache.loaded_count());
                Ok(())
            }
            Ok(Some(false)) => Ok(()),
            Ok(None) => Err(QaError::UnknownModel(model_id.to_string())),
            Err(source) => {
                tracing::error!(model_id = %model_id, error = %source, "Model load failed");
                crate::metrics::record_model_load_failure(model_id);
                Err(QaError::ModelLoad {
                    model_id: model_id.to_string(),
                    source,
                })
            }
        }
    }

    /// Load if needed and take a lease that pins the pipeline in memory
    pub async fn acquire(&self, model_id: &str) -> QaResult<PipelineLease> {
        loop {
            self.ensure_loaded(model_id).await?;
            if let Some(lease) = self.cache.lease(model_id).await {
                return Ok(lease);
            }
            // Evicted between load and lease
            tracing::debug!(model_id = %model_id, "Model evicted before use, reloading");
        }
    }

    /// Record a successful inference on `model_id`
    pub async fn touch(&self, model_id: &str) {
        self.cache.touch(model_id).await;
    }

    /// Unload models unused for longer than `threshold`
    ///
    /// Models with an inference in flight are skipped. Never fails.
    pub async fn evict_idle(&self, threshold: Duration) -> Vec<String> {
        let evicted = self
            .cache
            .evict_expired(&EvictionPolicy::idle_for(threshold), Instant::now())
            .await;

        if !evicted.is_empty() {
            for model_id in &evicted {
                crate::metrics::record_model_evicted(model_id);
            }
            crate::metrics::update_loaded_models(self.cache.loaded_count());
        }

        evicted
    }

    /// Unload a single model, waiting for in-flight calls
    pub async fn unload(&self, model_id: &str) -> bool {
        let unloaded = self.cache.unload(model_id).await;
        if unloaded {
            tracing::info!(model_id = %model_id, "Model unloaded");
            crate::metrics::update_loaded_models(self.cache.loaded_count());
        }
        unloaded
    }

    /// Release every loaded pipeline
    pub async fn shutdown(&self) {
        let count = self.cache.clear().await;
        crate::metrics::update_loaded_models(0);
        tracing::info!(unloaded = count, "Model registry shut down");
    }
}
