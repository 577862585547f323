//! ONNX Runtime span-extraction pipeline
//!
//! Long contexts are split into overlapping windows by the tokenizer
//! (question kept whole, context truncated with a stride). Every window is
//! run through the model and the span decoder picks the best answer across
//! all of them.

use super::span::{SpanDecoder, Window};
use super::{InferenceError, QaPipeline, SpanAnswer};
use crate::config::InferenceConfig;
use crate::device::ComputeDevice;
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::{Encoding, Tokenizer, TruncationParams, TruncationStrategy};

/// A loaded extractive QA model
///
/// The session sits behind a Mutex because `Session::run` needs `&mut self`
/// while pipelines are shared behind `&self`.
pub struct OnnxQaPipeline {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    decoder: SpanDecoder,
    use_token_type_ids: bool,
}

impl std::fmt::Debug for OnnxQaPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxQaPipeline")
            .field("decoder", &self.decoder)
            .field("use_token_type_ids", &self.use_token_type_ids)
            .finish_non_exhaustive()
    }
}

impl OnnxQaPipeline {
    /// Build a session for `model_path` and configure the tokenizer for
    /// windowed question/context encoding
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        use_token_type_ids: bool,
        device: ComputeDevice,
        config: &InferenceConfig,
    ) -> Result<Self, InferenceError> {
        let session = Session::builder()
            .map_err(|e: ort::Error| InferenceError::Runtime(e.to_string()))?
            .with_execution_providers(execution_providers(device))
            .map_err(|e| InferenceError::Runtime(e.to_string()))?
            .with_intra_threads(config.intra_threads)
            .map_err(|e: ort::Error| InferenceError::Runtime(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e: ort::Error| {
                InferenceError::Runtime(format!("ONNX load failed: {e}"))
            })?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| InferenceError::Tokenization(format!("Tokenizer load failed: {e}")))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_seq_len,
                strategy: TruncationStrategy::OnlySecond,
                stride: config.doc_stride,
                ..Default::default()
            }))
            .map_err(|e| InferenceError::Tokenization(e.to_string()))?;
        tokenizer.with_padding(None);

        tracing::info!(
            model = %model_path.display(),
            device = %device,
            use_token_type_ids,
            "ONNX QA pipeline loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            decoder: SpanDecoder::new(config.max_answer_len, config.handle_impossible_answer),
            use_token_type_ids,
        })
    }

    /// Encode the pair into one or more windows
    fn encode(&self, question: &str, context: &str) -> Result<Vec<Encoding>, InferenceError> {
        let mut first = self
            .tokenizer
            .encode((question, context), true)
            .map_err(|e| InferenceError::Tokenization(e.to_string()))?;

        let overflowing = first.take_overflowing();
        let mut windows = Vec::with_capacity(1 + overflowing.len());
        windows.push(first);
        windows.extend(overflowing);
        Ok(windows)
    }

    /// Run one window, returning (start_logits, end_logits)
    fn run_window(&self, encoding: &Encoding) -> Result<(Vec<f32>, Vec<f32>), InferenceError> {
        let seq_len = encoding.len();
        let to_i64 = |values: &[u32]| values.iter().map(|&v| v as i64).collect::<Vec<_>>();

        let ids_array = ndarray::Array2::from_shape_vec((1, seq_len), to_i64(encoding.get_ids()))
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;
        let mask_array = ndarray::Array2::from_shape_vec(
            (1, seq_len),
            to_i64(encoding.get_attention_mask()),
        )
        .map_err(|e| InferenceError::Runtime(e.to_string()))?;
        let type_array =
            ndarray::Array2::from_shape_vec((1, seq_len), to_i64(encoding.get_type_ids()))
                .map_err(|e| InferenceError::Runtime(e.to_string()))?;

        let ids_tensor = TensorRef::from_array_view(&ids_array)
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;
        let mask_tensor = TensorRef::from_array_view(&mask_array)
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| InferenceError::Runtime("Session lock poisoned".to_string()))?;

        let outputs = if self.use_token_type_ids {
            let type_tensor = TensorRef::from_array_view(&type_array)
                .map_err(|e| InferenceError::Runtime(e.to_string()))?;
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
            ])
        }
        .map_err(|e| InferenceError::Runtime(format!("ONNX inference failed: {e}")))?;

        let extract = |name: &str| -> Result<Vec<f32>, InferenceError> {
            let (shape, data) = outputs[name]
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::InvalidOutput(format!("{name}: {e}")))?;
            // Expected shape: [1, seq_len]
            if data.len() != seq_len {
                return Err(InferenceError::InvalidOutput(format!(
                    "{name} has shape {shape:?}, expected [1, {seq_len}]"
                )));
            }
            Ok(data.to_vec())
        };

        Ok((extract("start_logits")?, extract("end_logits")?))
    }
}

impl QaPipeline for OnnxQaPipeline {
    fn infer(&self, question: &str, context: &str) -> Result<SpanAnswer, InferenceError> {
        let encodings = self.encode(question, context)?;

        let mut logits = Vec::with_capacity(encodings.len());
        let mut offsets = Vec::with_capacity(encodings.len());
        for encoding in &encodings {
            logits.push(self.run_window(encoding)?);
            offsets.push(context_offsets(encoding));
        }

        let windows: Vec<Window<'_>> = logits
            .iter()
            .zip(&offsets)
            .map(|((start, end), offsets)| Window {
                start_logits: start,
                end_logits: end,
                context_offsets: offsets,
            })
            .collect();

        tracing::debug!(windows = windows.len(), "Decoding answer span");

        Ok(self.decoder.decode(&windows, context))
    }
}

/// Context byte offsets per token; everything outside the second sequence
/// is `None`
fn context_offsets(encoding: &Encoding) -> Vec<Option<(usize, usize)>> {
    encoding
        .get_sequence_ids()
        .into_iter()
        .zip(encoding.get_offsets())
        .map(|(seq, &(start, end))| (seq == Some(1) && end > start).then_some((start, end)))
        .collect()
}

fn execution_providers(device: ComputeDevice) -> Vec<ExecutionProviderDispatch> {
    match device {
        ComputeDevice::Cuda(index) => vec![
            CUDAExecutionProvider::default()
                .with_device_id(index as i32)
                .build(),
            CPUExecutionProvider::default().build(),
        ],
        ComputeDevice::CoreMl => vec![
            CoreMLExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ],
        ComputeDevice::Cpu => vec![CPUExecutionProvider::default().build()],
    }
}
