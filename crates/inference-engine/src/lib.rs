//! CLIP Inference Engine
//!
//! Zero-shot image classification on top of an ONNX export of CLIP:
//! model artifact management, preprocessing, tokenization, background
//! loading and a batched classification pipeline with progress reporting.

mod artifact;
mod engine;
mod loader;
mod pipeline;
mod preprocess;
mod tokenizer;

pub use artifact::{ArtifactStatus, ModelArtifact, DEFAULT_CHUNK_SIZE};
pub use engine::{
    argmax, classify_batch, describe, softmax_rows, ClassificationResult, ClipEngine,
    ClipEngineConfig, ZeroShotScorer,
};
pub use loader::{ModelHandle, ModelState};
pub use pipeline::{batch_size, BatchBounds, ClassificationPipeline};
pub use preprocess::{load_image, pixel_values, thumbnail, CLIP_MEAN, CLIP_STD, THUMBNAIL_SIZE};
pub use tokenizer::{LabelTokenizer, MAX_TEXT_TOKENS};

use std::path::PathBuf;
use thiserror::Error;

/// Errors during model handling and inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Model file '{}' not found and no split parts available", .0.display())]
    ModelMissing(PathBuf),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    #[error("Failed to load image {}: {reason}", path.display())]
    ImageLoad { path: PathBuf, reason: String },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Worker task failed: {0}")]
    TaskFailed(String),
    #[error("Classification cancelled")]
    Cancelled,
}

impl InferenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InferenceError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ort::Error> for InferenceError {
    fn from(err: ort::Error) -> Self {
        InferenceError::InferenceFailed(err.to_string())
    }
}
