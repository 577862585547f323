//! Model management module
//!
//! Provides functionality for:
//! - The catalog of known models and their lazy loading
//! - Caching loaded pipelines with idle eviction
//! - Fetching model files from the Hugging Face hub or local directories
//! - Parsing model metadata from config.json

pub mod cache;
pub mod hub;
pub mod loader;
pub mod metadata;
pub mod registry;

pub use cache::{EvictionPolicy, PipelineCache, PipelineLease};
pub use hub::{ModelFiles, fetch_model_files, local_model_files};
#[cfg(feature = "onnx")]
pub use loader::OnnxLoader;
pub use loader::{LoadError, PipelineLoader};
pub use metadata::{HfModelMetadata, parse_model_config};
pub use registry::{ModelDescriptor, ModelRegistry};
