//! Batched Classification Pipeline

use crate::engine::{classify_batch, ClassificationResult, ZeroShotScorer};
use crate::preprocess::load_image;
use crate::InferenceError;
use event_log::EventLog;
use image::RgbImage;
use metrics::{counter, histogram};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Limits for the adaptive batch size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchBounds {
    pub min: usize,
    pub max: usize,
}

impl Default for BatchBounds {
    fn default() -> Self {
        Self { min: 8, max: 128 }
    }
}

impl BatchBounds {
    /// A tenth of the workload, clamped to the bounds
    pub fn batch_size(&self, total: usize) -> usize {
        (total / 10).clamp(self.min.max(1), self.max.max(self.min).max(1))
    }
}

/// Batch size under the default bounds (8..=128)
pub fn batch_size(total: usize) -> usize {
    BatchBounds::default().batch_size(total)
}

/// Runs a scorer over a list of image paths in adaptively sized batches
pub struct ClassificationPipeline {
    scorer: Arc<dyn ZeroShotScorer>,
    events: Arc<EventLog>,
    bounds: BatchBounds,
}

impl ClassificationPipeline {
    pub fn new(scorer: Arc<dyn ZeroShotScorer>, events: Arc<EventLog>) -> Self {
        Self {
            scorer,
            events,
            bounds: BatchBounds::default(),
        }
    }

    pub fn with_bounds(mut self, bounds: BatchBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Classify every path against `labels`.
    ///
    /// After each batch that produced at least one loaded image, the
    /// percentage of paths processed so far is sent on `progress`. If the
    /// receiving side has gone away the run stops with
    /// [`InferenceError::Cancelled`].
    pub async fn run(
        &self,
        paths: Vec<PathBuf>,
        labels: Vec<String>,
        progress: Option<&mpsc::Sender<u8>>,
    ) -> Result<Vec<ClassificationResult>, InferenceError> {
        let total = paths.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let batch = self.bounds.batch_size(total);
        self.events
            .record(format!("Using batch size: {} for {} images.", batch, total));

        let labels = Arc::new(labels);
        let mut results = Vec::with_capacity(total);

        for (index, chunk) in paths.chunks(batch).enumerate() {
            let processed = index * batch + chunk.len();

            let chunk_paths = chunk.to_vec();
            let events = Arc::clone(&self.events);
            let loaded = tokio::task::spawn_blocking(move || load_batch(chunk_paths, &events))
                .await
                .map_err(|e| InferenceError::TaskFailed(e.to_string()))?;

            if loaded.is_empty() {
                debug!("Batch {} had no loadable images; skipping", index);
                continue;
            }

            let (batch_paths, images): (Vec<PathBuf>, Vec<RgbImage>) = loaded.into_iter().unzip();
            let scorer = Arc::clone(&self.scorer);
            let batch_labels = Arc::clone(&labels);
            let events = Arc::clone(&self.events);
            let timer = Instant::now();

            let batch_results = tokio::task::spawn_blocking(move || {
                classify_batch(scorer.as_ref(), &batch_paths, &images, &batch_labels, &events)
            })
            .await
            .map_err(|e| InferenceError::TaskFailed(e.to_string()))??;

            histogram!("classifier_batch_seconds").record(timer.elapsed().as_secs_f64());
            counter!("classifier_batches_total").increment(1);
            counter!("classifier_images_total").increment(batch_results.len() as u64);
            results.extend(batch_results);

            let percent = (processed * 100 / total) as u8;
            self.events.record(format!(
                "Progress: {}% - Processed {} images",
                percent,
                chunk.len()
            ));

            if let Some(tx) = progress {
                tx.send(percent).await.map_err(|_| InferenceError::Cancelled)?;
            }
        }

        info!("Classified {} of {} images", results.len(), total);
        Ok(results)
    }
}

/// Load a batch, logging and dropping images that fail to decode
fn load_batch(paths: Vec<PathBuf>, events: &EventLog) -> Vec<(PathBuf, RgbImage)> {
    paths
        .into_iter()
        .filter_map(|path| match load_image(&path) {
            Ok(image) => Some((path, image)),
            Err(e) => {
                let reason = match e {
                    InferenceError::ImageLoad { reason, .. } => reason,
                    other => other.to_string(),
                };
                events.record(format!("Error loading {}: {}", path.display(), reason));
                counter!("classifier_image_load_failures_total").increment(1);
                None
            }
        })
        .collect()
}
