//! Persistent storage for visit history.
//!
//! The log is kept as a single pretty-printed JSON file, `visits.json`, in
//! the data directory.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::visits::{VisitError, VisitLog, VisitResult};

/// File name of the persisted visit log.
pub const VISITS_FILE: &str = "visits.json";

/// Get the default data directory.
///
/// On Linux: `/var/lib/pilgrim/`
/// Elsewhere: the platform data dir, falling back to `./data`.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/lib/pilgrim")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "pilgrim")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("./data"))
    }
}

/// Get the default visit log path.
#[must_use]
pub fn default_visits_path() -> PathBuf {
    default_data_dir().join(VISITS_FILE)
}

/// JSON file backing a [`VisitLog`].
#[derive(Debug, Clone)]
pub struct VisitStore {
    path: PathBuf,
}

impl VisitStore {
    /// Store rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(VISITS_FILE),
        }
    }

    /// Store backed by an explicit file.
    #[must_use]
    pub const fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the log, returning an empty one if the file does not exist.
    ///
    /// `max_entries` caps the loaded log; a file written with a larger cap is
    /// trimmed to the most recent records.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self, max_entries: usize) -> VisitResult<VisitLog> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No visit log yet");
            return Ok(VisitLog::new(max_entries));
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| VisitError::Read {
            path: self.path.clone(),
            source,
        })?;
        let records = serde_json::from_str(&content).map_err(|source| VisitError::Parse {
            path: self.path.clone(),
            source,
        })?;

        Ok(VisitLog::from_records(records, max_entries))
    }

    /// Write the log, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, log: &VisitLog) -> VisitResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| VisitError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(log.records())?;
        std::fs::write(&self.path, content).map_err(|source| VisitError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}
