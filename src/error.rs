//! Error taxonomy shared by every component

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Failures that are reported to the caller as structured results
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Search query must not be empty")]
    EmptyQuery,

    #[error("Path does not exist: {0:?}")]
    InvalidPath(PathBuf),

    #[error("Path is not a directory: {0:?}")]
    NotADirectory(PathBuf),

    #[error("Unknown match type: {0} (expected exact, semantic or structural)")]
    UnknownMatchType(String),

    #[error("Store at {path:?} is unusable: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },
}

/// A non-fatal, per-file failure collected during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    /// Path relative to the project root (or absolute when outside it)
    pub path: String,
    /// Human-readable reason
    pub message: String,
}

impl FileError {
    pub fn new(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Make sure a project root exists and is a directory
pub fn ensure_directory(path: &std::path::Path) -> Result<(), CoreError> {
    if !path.exists() {
        return Err(CoreError::InvalidPath(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(CoreError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}
