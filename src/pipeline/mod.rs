//! Question-answering pipelines
//!
//! A pipeline is a loaded model plus its pre/post-processing. Every model
//! family is driven through the same [`QaPipeline`] capability; differences
//! between architectures (input names, token type ids) stay inside the
//! implementation.

#[cfg(feature = "onnx")]
pub mod onnx;
pub mod span;

#[cfg(feature = "onnx")]
pub use onnx::OnnxQaPipeline;
pub use span::{SpanDecoder, Window};

use serde::Serialize;
use thiserror::Error;

/// Failures raised by a loaded pipeline while answering
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Input could not be tokenized (e.g. question leaves no room for context)
    #[error("tokenization failed: {0}")]
    Tokenization(String),

    /// Runtime failure while running the model
    #[error("model execution failed: {0}")]
    Runtime(String),

    /// Model produced outputs we cannot interpret
    #[error("unexpected model output: {0}")]
    InvalidOutput(String),
}

/// Answer span located in the context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanAnswer {
    /// Exact slice `context[start..end]`; empty when the model judged the
    /// question unanswerable
    pub answer: String,
    /// Probability of the chosen span, in [0, 1]
    pub score: f32,
    /// Byte offsets into the context
    pub start: usize,
    pub end: usize,
}

impl SpanAnswer {
    pub fn empty(score: f32) -> Self {
        Self {
            answer: String::new(),
            score,
            start: 0,
            end: 0,
        }
    }
}

/// The single capability every loaded model exposes
///
/// Implementations are compute-bound and synchronous; callers run them on
/// the blocking pool.
pub trait QaPipeline: Send + Sync {
    fn infer(&self, question: &str, context: &str) -> Result<SpanAnswer, InferenceError>;
}
