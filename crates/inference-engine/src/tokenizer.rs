//! Label tokenizer for the CLIP text tower

use crate::InferenceError;
use ndarray::Array2;
use std::path::Path;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::info;

/// CLIP text context length
pub const MAX_TEXT_TOKENS: usize = 77;

/// Pad token of the OpenAI CLIP vocabulary (`<|endoftext|>`)
const CLIP_PAD_TOKEN: &str = "<|endoftext|>";

/// Tokenizes label batches into `input_ids` / `attention_mask`
pub struct LabelTokenizer {
    inner: Tokenizer,
}

impl LabelTokenizer {
    /// Load a HuggingFace `tokenizer.json`
    pub fn from_file(path: &Path) -> Result<Self, InferenceError> {
        info!("Loading tokenizer from {}", path.display());
        let inner = Tokenizer::from_file(path)
            .map_err(|e| InferenceError::Tokenizer(format!("{}: {}", path.display(), e)))?;
        Self::from_tokenizer(inner)
    }

    /// Wrap an already-built tokenizer, forcing batch-longest padding and
    /// truncation to the CLIP context length
    pub fn from_tokenizer(mut inner: Tokenizer) -> Result<Self, InferenceError> {
        let pad_id = inner.token_to_id(CLIP_PAD_TOKEN).unwrap_or(0);
        inner.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            pad_id,
            pad_token: CLIP_PAD_TOKEN.to_string(),
            ..Default::default()
        }));
        inner
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TEXT_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        Ok(Self { inner })
    }

    /// Encode labels as `(input_ids, attention_mask)`, one row per label
    pub fn encode(&self, labels: &[String]) -> Result<(Array2<i64>, Array2<i64>), InferenceError> {
        if labels.is_empty() {
            return Err(InferenceError::Tokenizer("no labels to encode".to_string()));
        }

        let encodings = self
            .inner
            .encode_batch(labels.iter().map(String::as_str).collect::<Vec<_>>(), true)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        let width = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        let mut ids = Array2::<i64>::zeros((labels.len(), width));
        let mut mask = Array2::<i64>::zeros((labels.len(), width));

        for (row, encoding) in encodings.iter().enumerate() {
            for (col, (&id, &m)) in encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .enumerate()
            {
                ids[[row, col]] = id as i64;
                mask[[row, col]] = m as i64;
            }
        }

        Ok((ids, mask))
    }
}
