//! Error types for time-series stores.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create {0}: no catchment ids given")]
    MissingCatchments(PathBuf),

    #[error("Malformed header in {path}: {reason}")]
    MalformedHeader { path: PathBuf, reason: String },

    #[error("Malformed row {line} in {path}: {reason}")]
    MalformedRow {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Inconsistent catchment ids for {path}: {detail}")]
    ColumnOrder { path: PathBuf, detail: String },

    #[error("Scene {scene_id} is already recorded in {path}")]
    AlreadyRecorded { path: PathBuf, scene_id: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that leave the scene retryable on the next run.
    pub fn is_consistency(&self) -> bool {
        matches!(
            self,
            StoreError::ColumnOrder { .. } | StoreError::AlreadyRecorded { .. }
        )
    }
}
