//! Question answering over a context string

use crate::error::{QaError, QaResult};
use crate::models::ModelRegistry;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Answer returned to API clients
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InferenceResult {
    /// Substring of `context`; empty when the model found no answer
    pub answer: String,
    /// In [0, 1]
    pub confidence: f32,
    pub context: String,
    pub model_used: String,
    /// Seconds spent in the model call
    pub processing_time: f64,
}

/// Selects a model, makes sure it is loaded and runs it
#[derive(Clone)]
pub struct QaService {
    registry: Arc<ModelRegistry>,
}

impl QaService {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Answer `question` from `context` with the named model, or the default
    ///
    /// Fails with `InvalidInput` for blank input, `UnknownModel` for names
    /// not in the catalog, `ModelLoad` if the model cannot be instantiated
    /// and `Inference` if the model call fails. Nothing is retried.
    pub async fn answer(
        &self,
        question: &str,
        context: &str,
        model: Option<&str>,
    ) -> QaResult<InferenceResult> {
        if question.trim().is_empty() {
            return Err(QaError::InvalidInput("Question cannot be empty".to_string()));
        }
        if context.trim().is_empty() {
            return Err(QaError::InvalidInput("Context cannot be empty".to_string()));
        }

        let model_id = self.registry.resolve(model)?.to_string();
        let lease = self.registry.acquire(&model_id).await?;

        let question_owned = question.to_string();
        let context_owned = context.to_string();

        let started = Instant::now();
        // The lease moves into the blocking task so the model stays loaded
        // until the call returns, even if this request is dropped. It comes
        // back out so the idle clock is reset before the model is unpinned.
        let outcome = tokio::task::spawn_blocking(move || {
            let result = lease.pipeline().infer(&question_owned, &context_owned);
            (result, context_owned, lease)
        })
        .await
        .map_err(|e| anyhow::anyhow!("inference task failed: {e}"))?;
        let elapsed = started.elapsed();

        let (result, context, lease) = outcome;
        let span = result.map_err(|source| {
            tracing::error!(model_id = %model_id, error = %source, "Inference failed");
            QaError::Inference {
                model_id: model_id.clone(),
                source,
            }
        })?;

        self.registry.touch(&model_id).await;
        drop(lease);
        crate::metrics::record_answer(&model_id, elapsed);

        tracing::info!(
            model_id = %model_id,
            answer_len = span.answer.len(),
            confidence = span.score,
            elapsed_ms = elapsed.as_millis() as u64,
            "Question answered"
        );

        let confidence = if span.score.is_finite() {
            span.score.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Ok(InferenceResult {
            answer: span.answer,
            confidence,
            context,
            model_used: model_id,
            processing_time: elapsed.as_secs_f64(),
        })
    }
}
