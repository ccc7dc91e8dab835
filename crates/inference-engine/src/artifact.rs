//! Split Model Artifact
//!
//! The ONNX export is too large for most source hosts, so it ships as
//! fixed-size `.part` chunks next to where the combined file is expected.
//! Part `i` is named `{prefix}{i}.part`.

use crate::InferenceError;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default chunk size (90 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 90 * 1024 * 1024;

/// Outcome of [`ModelArtifact::ensure_present`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// Combined model file was already on disk
    AlreadyPresent,
    /// Model was rebuilt from this many parts
    Reassembled(usize),
}

/// Location and chunking of the model file
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    model_path: PathBuf,
    split_prefix: PathBuf,
    chunk_size: u64,
}

impl ModelArtifact {
    /// `split_prefix` is a path whose final component is the part-name prefix,
    /// e.g. `models/clip_model_part_`.
    pub fn new(model_path: impl Into<PathBuf>, split_prefix: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            split_prefix: split_prefix.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    fn parts_dir(&self) -> &Path {
        match self.split_prefix.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    fn prefix_name(&self) -> String {
        self.split_prefix
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Path of part `index`
    pub fn part_path(&self, index: usize) -> PathBuf {
        self.parts_dir()
            .join(format!("{}{}.part", self.prefix_name(), index))
    }

    /// Existing files in the parts directory whose name starts with the prefix
    pub fn part_files(&self) -> Result<Vec<PathBuf>, InferenceError> {
        let dir = self.parts_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let prefix = self.prefix_name();
        let mut parts = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| InferenceError::io(dir, e))? {
            let entry = entry.map_err(|e| InferenceError::io(dir, e))?;
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                parts.push(entry.path());
            }
        }
        parts.sort();
        Ok(parts)
    }

    /// Split the combined model into parts, returning the part count
    pub fn split(&self) -> Result<usize, InferenceError> {
        if !self.model_path.exists() {
            return Err(InferenceError::ModelMissing(self.model_path.clone()));
        }

        let source = File::open(&self.model_path)
            .map_err(|e| InferenceError::io(&self.model_path, e))?;
        let mut reader = BufReader::new(source);

        let mut index = 0;
        loop {
            let exhausted = reader
                .fill_buf()
                .map_err(|e| InferenceError::io(&self.model_path, e))?
                .is_empty();
            if exhausted {
                break;
            }

            let part_path = self.part_path(index);
            let mut out = BufWriter::new(
                File::create(&part_path).map_err(|e| InferenceError::io(&part_path, e))?,
            );
            let written = io::copy(&mut (&mut reader).take(self.chunk_size), &mut out)
                .and_then(|n| out.flush().map(|_| n))
                .map_err(|e| InferenceError::io(&part_path, e))?;
            debug!("Wrote {} ({} bytes)", part_path.display(), written);
            index += 1;
        }

        info!("Model split into {} parts.", index);
        Ok(index)
    }

    /// Concatenate parts `0, 1, 2, …` up to the first gap into the model file.
    ///
    /// Output goes to a sibling temporary file that is renamed into place
    /// once every part has been copied.
    pub fn combine(&self) -> Result<usize, InferenceError> {
        if !self.part_path(0).exists() {
            return Err(InferenceError::ModelMissing(self.model_path.clone()));
        }

        let staging = self.staging_path();
        let mut out = BufWriter::new(
            File::create(&staging).map_err(|e| InferenceError::io(&staging, e))?,
        );

        let mut index = 0;
        while self.part_path(index).exists() {
            let part_path = self.part_path(index);
            let mut part = File::open(&part_path).map_err(|e| InferenceError::io(&part_path, e))?;
            io::copy(&mut part, &mut out).map_err(|e| InferenceError::io(&staging, e))?;
            index += 1;
        }

        out.flush().map_err(|e| InferenceError::io(&staging, e))?;
        drop(out);
        fs::rename(&staging, &self.model_path)
            .map_err(|e| InferenceError::io(&self.model_path, e))?;

        info!("Model reassembled from {} parts.", index);
        Ok(index)
    }

    /// Make sure the combined model exists, rebuilding it from parts if needed
    pub fn ensure_present(&self) -> Result<ArtifactStatus, InferenceError> {
        if let Some(dir) = self.model_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| InferenceError::io(dir, e))?;
        }

        if self.model_path.exists() {
            return Ok(ArtifactStatus::AlreadyPresent);
        }

        if self.part_files()?.is_empty() {
            return Err(InferenceError::ModelMissing(self.model_path.clone()));
        }

        info!("Detected split model parts. Reassembling...");
        self.combine().map(ArtifactStatus::Reassembled)
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .model_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".partial");
        self.model_path.with_file_name(name)
    }
}
