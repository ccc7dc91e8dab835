//! Event Log
//!
//! Keeps every user-visible event in memory so it can be served over the API,
//! and mirrors each one as a line to an append-only file. The buffer is
//! unbounded; it only shrinks when explicitly cleared.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

/// Timestamp layout used in the mirror file
const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Event log errors
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("Failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single recorded event
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl LogEntry {
    /// Render the entry as a mirror-file line (without newline)
    pub fn to_line(&self) -> String {
        format!("{} - {}", self.timestamp.format(FILE_TIMESTAMP_FORMAT), self.message)
    }
}

struct Mirror {
    path: PathBuf,
    file: File,
}

/// In-memory event buffer with an optional file mirror
pub struct EventLog {
    entries: Mutex<Vec<LogEntry>>,
    mirror: Option<Mutex<Mirror>>,
}

impl EventLog {
    /// Memory-only log
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            mirror: None,
        }
    }

    /// Log mirrored to `path` (created if missing, always appended to)
    pub fn with_file(path: impl AsRef<Path>) -> Result<Self, EventLogError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| EventLogError::Open {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            entries: Mutex::new(Vec::new()),
            mirror: Some(Mutex::new(Mirror { path, file })),
        })
    }

    /// Record an event
    pub fn record(&self, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Local::now(),
            message: message.into(),
        };

        info!(target: "events", "{}", entry.message);

        if let Some(mirror) = &self.mirror {
            if let Ok(mut mirror) = mirror.lock() {
                if let Err(e) = writeln!(mirror.file, "{}", entry.to_line()) {
                    warn!("Failed to write to {}: {}", mirror.path.display(), e);
                }
            }
        }

        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    /// Snapshot of all entries, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Messages only, oldest first
    pub fn messages(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|e| e.iter().map(|entry| entry.message.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the in-memory entries. The mirror file keeps its history.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Path of the mirror file, if any
    pub fn file_path(&self) -> Option<PathBuf> {
        self.mirror
            .as_ref()
            .and_then(|m| m.lock().ok().map(|m| m.path.clone()))
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::in_memory()
    }
}
