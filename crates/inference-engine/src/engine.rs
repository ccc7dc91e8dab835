//! CLIP Inference Engine Implementation

use crate::preprocess::{pixel_values, THUMBNAIL_SIZE};
use crate::tokenizer::LabelTokenizer;
use crate::InferenceError;
use event_log::EventLog;
use image::RgbImage;
use ndarray::{Array2, ArrayView1, Axis};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Scores a batch of images against a set of text labels
pub trait ZeroShotScorer: Send + Sync {
    /// Raw similarity logits, shape `[images.len(), labels.len()]`
    fn logits(&self, images: &[RgbImage], labels: &[String]) -> Result<Array2<f32>, InferenceError>;
}

/// Result for one classified image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// File name without directories
    pub filename: String,
    /// Most probable label
    pub label: String,
    /// Human-readable distribution, e.g. `" (cat 97% dog 3%)"`
    pub confidence: String,
}

/// Settings for [`ClipEngine`]
#[derive(Debug, Clone)]
pub struct ClipEngineConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    /// Square input resolution of the vision tower
    pub image_size: u32,
    pub intra_threads: usize,
}

impl Default for ClipEngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/clip_model_quantized.onnx"),
            tokenizer_path: PathBuf::from("models/tokenizer.json"),
            image_size: THUMBNAIL_SIZE,
            intra_threads: 4,
        }
    }
}

/// ONNX Runtime session over a combined CLIP export
/// (`input_ids`, `pixel_values`, `attention_mask` → `logits_per_image`)
pub struct ClipEngine {
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    tokenizer: LabelTokenizer,
    image_size: u32,
    model_path: PathBuf,
}

impl ClipEngine {
    /// Load the ONNX session and tokenizer. Blocking.
    pub fn load(config: &ClipEngineConfig) -> Result<Self, InferenceError> {
        info!("Creating CLIP engine with model: {}", config.model_path.display());
        if !config.model_path.is_file() {
            return Err(InferenceError::ModelMissing(config.model_path.clone()));
        }

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(config.intra_threads))
            .and_then(|b| b.commit_from_file(&config.model_path))
            .map_err(|e| InferenceError::ModelLoadError(e.to_string()))?;

        let tokenizer = LabelTokenizer::from_file(&config.tokenizer_path)?;

        info!("Model loaded successfully");
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            image_size: config.image_size,
            model_path: config.model_path.clone(),
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl ZeroShotScorer for ClipEngine {
    fn logits(&self, images: &[RgbImage], labels: &[String]) -> Result<Array2<f32>, InferenceError> {
        let start = std::time::Instant::now();
        let (input_ids, attention_mask) = self.tokenizer.encode(labels)?;
        let pixels = pixel_values(images, self.image_size);

        // Flattened row-major buffers with explicit shapes
        let (labels_n, tokens) = input_ids.dim();
        let (batch, channels, height, width) = pixels.dim();
        let input_ids = Tensor::from_array(([labels_n, tokens], input_ids.into_iter().collect::<Vec<i64>>()))?;
        let attention_mask =
            Tensor::from_array(([labels_n, tokens], attention_mask.into_iter().collect::<Vec<i64>>()))?;
        let pixels = Tensor::from_array((
            [batch, channels, height, width],
            pixels.into_iter().collect::<Vec<f32>>(),
        ))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::InferenceFailed(format!("session lock poisoned: {}", e)))?;
        let outputs = session.run(ort::inputs![
            "input_ids" => input_ids,
            "pixel_values" => pixels,
            "attention_mask" => attention_mask,
        ])?;

        let output = outputs
            .values()
            .next()
            .ok_or_else(|| InferenceError::InferenceFailed("model produced no outputs".to_string()))?;
        let (shape, data) = output.try_extract_tensor::<f32>()?;

        let expected = (images.len(), labels.len());
        let actual: Vec<i64> = shape.iter().copied().collect();
        if actual != [expected.0 as i64, expected.1 as i64] {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{:?}", expected),
                actual: format!("{:?}", actual),
            });
        }
        let logits = Array2::from_shape_vec(expected, data.to_vec())
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        debug!("Inference completed in {}ms", start.elapsed().as_millis());
        Ok(logits)
    }
}

/// Numerically stable softmax over each row
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut probs = logits.clone();
    for mut row in probs.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|x| (x - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|x| x / sum);
        }
    }
    probs
}

/// Index of the largest value (first one on ties)
pub fn argmax(row: ArrayView1<'_, f32>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
        .0
}

/// Confidence string in label order, e.g. `" (cat 97% dog 3%)"`
pub fn describe(labels: &[String], probs: ArrayView1<'_, f32>) -> String {
    let parts: Vec<String> = labels
        .iter()
        .zip(probs.iter())
        .map(|(label, &p)| format!("{} {:.0}%", label, f64::from(p) * 100.0))
        .collect();
    format!(" ({})", parts.join(" "))
}

/// Score one batch of already-loaded images.
///
/// `paths[i]` must be the source of `images[i]`.
pub fn classify_batch(
    scorer: &dyn ZeroShotScorer,
    paths: &[PathBuf],
    images: &[RgbImage],
    labels: &[String],
    events: &EventLog,
) -> Result<Vec<ClassificationResult>, InferenceError> {
    if paths.len() != images.len() {
        return Err(InferenceError::InvalidInputShape {
            expected: format!("{} paths", images.len()),
            actual: format!("{} paths", paths.len()),
        });
    }

    if labels.is_empty() {
        return Err(InferenceError::InvalidInputShape {
            expected: "at least one label".to_string(),
            actual: "0 labels".to_string(),
        });
    }

    let logits = scorer.logits(images, labels)?;
    if logits.dim() != (images.len(), labels.len()) {
        return Err(InferenceError::InvalidInputShape {
            expected: format!("{:?}", (images.len(), labels.len())),
            actual: format!("{:?}", logits.dim()),
        });
    }
    let probs = softmax_rows(&logits);

    let results = paths
        .iter()
        .zip(probs.axis_iter(Axis(0)))
        .map(|(path, row)| {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let label = labels[argmax(row)].clone();
            let confidence = describe(labels, row);

            events.record(format!("Processed {} -> {}{}", filename, label, confidence));
            ClassificationResult {
                filename,
                label,
                confidence,
            }
        })
        .collect();

    Ok(results)
}
