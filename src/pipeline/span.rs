//! Answer span decoding from start/end logits
//!
//! Each model window yields one start and one end logit per token. Tokens
//! outside the context are masked out (except the leading CLS token, which
//! stands for "no answer" when unanswerable questions are allowed), the
//! remaining logits are turned into probabilities, and the span maximising
//! `p_start[i] * p_end[j]` with `i <= j < i + max_answer_len` wins. Across
//! windows the best span is kept; the lowest "no answer" score across
//! windows beats it when it is higher.

use super::SpanAnswer;

/// Token-level view of one model window
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    pub start_logits: &'a [f32],
    pub end_logits: &'a [f32],
    /// Byte range in the context for each context token; `None` for question
    /// and special tokens
    pub context_offsets: &'a [Option<(usize, usize)>],
}

/// Best candidate inside a single window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowBest {
    /// Byte span and its probability, if the window holds any context
    pub span: Option<(usize, usize, f32)>,
    /// Probability of "no answer" (CLS start and end)
    pub null_score: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanDecoder {
    max_answer_len: usize,
    handle_impossible_answer: bool,
}

impl SpanDecoder {
    pub fn new(max_answer_len: usize, handle_impossible_answer: bool) -> Self {
        Self {
            max_answer_len: max_answer_len.max(1),
            handle_impossible_answer,
        }
    }

    /// Score every window and pick the answer for `context`
    pub fn decode(&self, windows: &[Window<'_>], context: &str) -> SpanAnswer {
        let mut best: Option<(usize, usize, f32)> = None;
        let mut min_null: Option<f32> = None;

        for window in windows {
            let result = self.decode_window(window);

            if let Some(null) = result.null_score {
                min_null = Some(min_null.map_or(null, |m| m.min(null)));
            }

            if let Some(span) = result.span {
                let (start, end, _) = span;
                // Offsets that do not land on char boundaries cannot be sliced
                if context.get(start..end).is_none() {
                    continue;
                }
                if best.is_none_or(|(_, _, score)| span.2 > score) {
                    best = Some(span);
                }
            }
        }

        match (best, min_null) {
            (Some((_, _, score)), Some(null)) if null > score => SpanAnswer::empty(null),
            (Some((start, end, score)), _) => SpanAnswer {
                answer: context[start..end].to_string(),
                score: clamp_probability(score),
                start,
                end,
            },
            (None, Some(null)) => SpanAnswer::empty(null),
            (None, None) => SpanAnswer::empty(0.0),
        }
    }

    /// Find the best span inside one window
    pub fn decode_window(&self, window: &Window<'_>) -> WindowBest {
        let len = window
            .start_logits
            .len()
            .min(window.end_logits.len())
            .min(window.context_offsets.len());

        let allowed: Vec<bool> = (0..len)
            .map(|i| {
                window.context_offsets[i].is_some() || (i == 0 && self.handle_impossible_answer)
            })
            .collect();

        let start_probs = masked_softmax(&window.start_logits[..len], &allowed);
        let end_probs = masked_softmax(&window.end_logits[..len], &allowed);

        let null_score = (self.handle_impossible_answer && len > 0)
            .then(|| clamp_probability(start_probs[0] * end_probs[0]));

        let mut span: Option<(usize, usize, f32)> = None;
        for i in 0..len {
            let Some((start_byte, _)) = window.context_offsets[i] else {
                continue;
            };
            let last = (i + self.max_answer_len).min(len);
            for j in i..last {
                let Some((_, end_byte)) = window.context_offsets[j] else {
                    continue;
                };
                if end_byte < start_byte {
                    continue;
                }
                let score = start_probs[i] * end_probs[j];
                if span.is_none_or(|(_, _, best)| score > best) {
                    span = Some((start_byte, end_byte, clamp_probability(score)));
                }
            }
        }

        WindowBest { span, null_score }
    }
}

/// Softmax over the allowed positions; disallowed positions get zero
pub fn masked_softmax(logits: &[f32], allowed: &[bool]) -> Vec<f32> {
    let max = logits
        .iter()
        .zip(allowed)
        .filter(|(_, ok)| **ok)
        .map(|(l, _)| *l)
        .fold(f32::NEG_INFINITY, f32::max);

    if !max.is_finite() {
        return vec![0.0; logits.len()];
    }

    let exps: Vec<f32> = logits
        .iter()
        .zip(allowed)
        .map(|(l, ok)| if *ok { (l - max).exp() } else { 0.0 })
        .collect();
    let sum: f32 = exps.iter().sum();

    if sum > 0.0 && sum.is_finite() {
        exps.into_iter().map(|e| e / sum).collect()
    } else {
        vec![0.0; logits.len()]
    }
}

fn clamp_probability(p: f32) -> f32 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}
