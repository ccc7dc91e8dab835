//! Upload Store
//!
//! Uploads are references to files already on the local disk. Nothing is
//! copied; a path is accepted when it exists and carries a recognized image
//! extension. Existence is only checked here, so a path may be stale by the
//! time it is classified.

use crate::StorageError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Extensions decoded by the regular image codecs
pub const RASTER_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tiff", "bmp", "webp"];

/// Camera raw extensions that need a raw decoder
pub const RAW_EXTENSIONS: [&str; 4] = ["cr2", "nef", "arw", "dng"];

/// Decoder family for an accepted image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// PNG, JPEG, TIFF, BMP, WebP
    Raster,
    /// Camera raw (CR2, NEF, ARW, DNG)
    Raw,
}

impl ImageKind {
    /// Classify a path by its extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if RASTER_EXTENSIONS.contains(&ext.as_str()) {
            Some(ImageKind::Raster)
        } else if RAW_EXTENSIONS.contains(&ext.as_str()) {
            Some(ImageKind::Raw)
        } else {
            None
        }
    }
}

/// Ordered list of validated image paths
pub struct UploadStore {
    files: Mutex<Vec<PathBuf>>,
}

impl UploadStore {
    /// Create an empty upload store
    pub fn new() -> Self {
        Self {
            files: Mutex::new(Vec::new()),
        }
    }

    /// Validate a single path
    pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf, StorageError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(StorageError::FileNotFound(path.to_path_buf()));
        }

        if ImageKind::from_path(path).is_none() {
            return Err(StorageError::UnsupportedFileType(path.to_path_buf()));
        }

        Ok(path.to_path_buf())
    }

    /// Validate every path, then append them all.
    ///
    /// The request is all-or-nothing: the first invalid path aborts it and
    /// the store is left unchanged.
    pub fn add_all<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<PathBuf>, StorageError> {
        let valid = paths
            .iter()
            .map(Self::validate)
            .collect::<Result<Vec<_>, _>>()?;

        let mut files = self
            .files
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        files.extend(valid.iter().cloned());

        info!("Accepted {} image paths ({} stored)", valid.len(), files.len());
        Ok(valid)
    }

    /// Current paths in upload order
    pub fn list(&self) -> Vec<PathBuf> {
        self.files.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove one stored entry per path in `taken`, leaving paths uploaded
    /// after `taken` was read. Files on disk are not touched.
    pub fn discard(&self, taken: &[PathBuf]) {
        if let Ok(mut files) = self.files.lock() {
            for path in taken {
                if let Some(index) = files.iter().position(|f| f == path) {
                    files.remove(index);
                }
            }
            debug!("Discarded {} paths ({} left)", taken.len(), files.len());
        }
    }

    /// Forget every stored path. Files on disk are not touched.
    pub fn clear(&self) {
        if let Ok(mut files) = self.files.lock() {
            debug!("Clearing {} stored paths", files.len());
            files.clear();
        }
    }
}

impl Default for UploadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("storage-uploads-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"not really an image").unwrap();
        path
    }

    #[test]
    fn test_discard_removes_only_taken_entries() {
        let dir = scratch_dir();
        let a = touch(&dir, "a.png");
        let b = touch(&dir, "b.png");
        let store = UploadStore::new();
        store.add_all(&[&a, &a, &b]).unwrap();
        let taken = store.list();
        store.add_all(&[&a]).unwrap();

        store.discard(&taken);
        assert_eq!(store.list(), vec![a]);
    }

    #[test]
    fn test_image_kind_from_extension() {
        assert_eq!(ImageKind::from_path(Path::new("a/b.JPG")), Some(ImageKind::Raster));
        assert_eq!(ImageKind::from_path(Path::new("shot.nef")), Some(ImageKind::Raw));
        assert_eq!(ImageKind::from_path(Path::new("shot.Dng")), Some(ImageKind::Raw));
        assert_eq!(ImageKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(ImageKind::from_path(Path::new("no_extension")), None);
    }

    #[test]
    fn test_missing_file_rejected() {
        let dir = scratch_dir();
        let missing = dir.join("ghost.png");

        let err = UploadStore::validate(&missing).unwrap_err();
        assert!(matches!(err, StorageError::FileNotFound(_)));
        assert!(err.to_string().starts_with("File not found: "));
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let dir = scratch_dir();
        let text = touch(&dir, "notes.txt");

        let err = UploadStore::validate(&text).unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedFileType(_)));
    }

    #[test]
    fn test_add_all_is_all_or_nothing() {
        let dir = scratch_dir();
        let good = touch(&dir, "cat.png");
        let bad = touch(&dir, "cat.gif");

        let store = UploadStore::new();
        assert!(store.add_all(&[good.clone(), bad]).is_err());
        assert!(store.is_empty());

        let accepted = store.add_all(&[good.clone()]).unwrap();
        assert_eq!(accepted, vec![good]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear_keeps_files_on_disk() {
        let dir = scratch_dir();
        let path = touch(&dir, "raw.CR2");

        let store = UploadStore::new();
        store.add_all(&[&path]).unwrap();
        store.clear();

        assert!(store.is_empty());
        assert!(path.exists());
    }

    proptest! {
        #[test]
        fn prop_unknown_extensions_never_classified(ext in "[a-z]{1,5}") {
            prop_assume!(!RASTER_EXTENSIONS.contains(&ext.as_str()));
            prop_assume!(!RAW_EXTENSIONS.contains(&ext.as_str()));
            let name = format!("image.{}", ext);
            prop_assert_eq!(ImageKind::from_path(Path::new(&name)), None);
        }
    }
}
