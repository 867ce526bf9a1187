//! JSON file holding the tracked-process ledger.
//!
//! The file is a plain JSON array of [`TrackedProcessRecord`]s:
//!
//! ```json
//! [
//!   { "process_id": 4242, "process_name": "notepad.exe", "start_time_ms": 1700000000000 }
//! ]
//! ```
//!
//! Writes go to a sibling temporary file first and are then renamed over the
//! real one, so a crash mid-write leaves either the old or the new ledger on
//! disk, never a truncated one.

use std::path::{Path, PathBuf};

use tabhost_core::TrackedProcessRecord;
use thiserror::Error;

/// Error type for ledger file operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing tracker file at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file content is not a valid record list.
    #[error("failed to parse tracker file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistence seam for the tracked-process ledger.
#[cfg_attr(test, mockall::automock)]
pub trait TrackerStore: Send + Sync {
    /// Reads every record.  A missing file is an empty ledger.
    fn load(&self) -> Result<Vec<TrackedProcessRecord>, StoreError>;

    /// Replaces the ledger with `records`.
    fn save(&self, records: &[TrackedProcessRecord]) -> Result<(), StoreError>;

    /// Deletes the ledger.
    fn clear(&self) -> Result<(), StoreError>;
}

/// [`TrackerStore`] backed by one JSON file.
#[derive(Debug, Clone)]
pub struct JsonTrackerStore {
    path: PathBuf,
}

impl JsonTrackerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl TrackerStore for JsonTrackerStore {
    fn load(&self) -> Result<Vec<TrackedProcessRecord>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Self::io_error(&self.path, e)),
        }
    }

    fn save(&self, records: &[TrackedProcessRecord]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| Self::io_error(dir, e))?;
        }
        let content = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| Self::io_error(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| Self::io_error(&self.path, e))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&self.path, e)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
