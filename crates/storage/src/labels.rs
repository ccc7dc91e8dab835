//! Label Store

use crate::StorageError;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Ordered, case-sensitive set of classification labels
pub struct LabelStore {
    labels: Mutex<Vec<String>>,
}

impl LabelStore {
    /// Create an empty label store
    pub fn new() -> Self {
        Self {
            labels: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<String>>, StorageError> {
        self.labels
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }

    /// Add a label, returning the labels after insertion
    pub fn add(&self, label: &str) -> Result<Vec<String>, StorageError> {
        if label.trim().is_empty() {
            return Err(StorageError::InvalidLabel);
        }

        let mut labels = self.lock()?;
        if labels.iter().any(|l| l == label) {
            return Err(StorageError::DuplicateLabel(label.to_string()));
        }

        labels.push(label.to_string());
        debug!("Added label {:?} ({} total)", label, labels.len());
        Ok(labels.clone())
    }

    /// Remove a label, returning the labels after removal
    pub fn remove(&self, label: &str) -> Result<Vec<String>, StorageError> {
        let mut labels = self.lock()?;
        let index = labels
            .iter()
            .position(|l| l == label)
            .ok_or_else(|| StorageError::LabelNotFound(label.to_string()))?;

        labels.remove(index);
        debug!("Removed label {:?} ({} left)", label, labels.len());
        Ok(labels.clone())
    }

    /// Current labels in insertion order
    pub fn list(&self) -> Vec<String> {
        self.labels.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.labels.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the given labels, keeping any others added since they were read
    pub fn discard(&self, taken: &[String]) {
        if let Ok(mut labels) = self.labels.lock() {
            labels.retain(|l| !taken.contains(l));
        }
    }

    /// Remove every label
    pub fn clear(&self) {
        if let Ok(mut labels) = self.labels.lock() {
            labels.clear();
        }
    }
}

impl Default for LabelStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_keeps_insertion_order() {
        let store = LabelStore::new();
        store.add("dog").unwrap();
        let labels = store.add("cat").unwrap();

        assert_eq!(labels, vec!["dog", "cat"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let store = LabelStore::new();
        store.add("cat").unwrap();

        let err = store.add("cat").unwrap_err();
        assert!(matches!(err, StorageError::DuplicateLabel(ref l) if l == "cat"));
        assert_eq!(err.to_string(), "Label already exists.");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_labels_are_case_sensitive() {
        let store = LabelStore::new();
        store.add("cat").unwrap();
        store.add("Cat").unwrap();

        assert_eq!(store.list(), vec!["cat", "Cat"]);
    }

    #[test]
    fn test_discard_keeps_later_labels() {
        let store = LabelStore::new();
        store.add("cat").unwrap();
        store.add("dog").unwrap();
        let taken = store.list();
        store.add("bird").unwrap();

        store.discard(&taken);
        assert_eq!(store.list(), vec!["bird"]);
    }

    #[test]
    fn test_remove_unknown_label() {
        let store = LabelStore::new();
        store.add("cat").unwrap();

        let err = store.remove("dog").unwrap_err();
        assert_eq!(err.to_string(), "Label not found.");
        assert_eq!(store.list(), vec!["cat"]);
    }

    #[test]
    fn test_remove_then_readd() {
        let store = LabelStore::new();
        store.add("cat").unwrap();
        store.add("dog").unwrap();

        assert_eq!(store.remove("cat").unwrap(), vec!["dog"]);
        assert_eq!(store.add("cat").unwrap(), vec!["dog", "cat"]);
    }

    #[test]
    fn test_blank_label_rejected() {
        let store = LabelStore::new();
        assert!(matches!(store.add("   "), Err(StorageError::InvalidLabel)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear() {
        let store = LabelStore::new();
        store.add("cat").unwrap();
        store.clear();
        assert!(store.is_empty());
    }
}
