//! QA Server - extractive question answering over HTTP
//!
//! Serves a catalog of transformer QA models, loaded lazily and unloaded when
//! idle, and answers questions from supplied text or uploaded PDF/text
//! documents (with OCR for scanned PDFs).

pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod eviction;
pub mod extract;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod qa;
pub mod text;

pub use config::{ModelSpec, ServerConfig};
pub use error::{QaError, QaResult};
pub use eviction::IdleEvictor;
pub use extract::{DocumentExtractor, ExtractedDocument, ExtractionMethod};
pub use models::{ModelDescriptor, ModelRegistry, PipelineLoader};
pub use pipeline::{QaPipeline, SpanAnswer};
pub use qa::{InferenceResult, QaService};
