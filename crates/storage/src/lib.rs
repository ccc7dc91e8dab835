//! Storage Layer
//!
//! Process-wide label and upload stores. Both live for the lifetime of the
//! server and are cleared after each completed classification run.

mod labels;
mod uploads;

pub use labels::LabelStore;
pub use uploads::{ImageKind, UploadStore, RASTER_EXTENSIONS, RAW_EXTENSIONS};

use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Label already exists.")]
    DuplicateLabel(String),
    #[error("Label not found.")]
    LabelNotFound(String),
    #[error("Label must not be blank.")]
    InvalidLabel,
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Unsupported file type: {}", .0.display())]
    UnsupportedFileType(PathBuf),
    #[error("Lock error: {0}")]
    LockPoisoned(String),
}
