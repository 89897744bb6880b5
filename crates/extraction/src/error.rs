//! Error types for the extraction crate.

use std::path::PathBuf;

use thiserror::Error;

use hydro_common::CommonError;
use raster_io::RasterError;
use ts_store::StoreError;
use zonal::ZonalError;

/// Result type alias using ExtractionError.
pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Errors that can occur while scanning, transforming or recording scenes.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The product directory is absent, e.g. an unmounted archive.
    #[error("Product directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),

    #[error("Failed to parse configuration YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode raster: {0}")]
    Raster(#[from] RasterError),

    #[error("Grid error: {0}")]
    Grid(#[from] CommonError),

    #[error("Catchment error: {0}")]
    Zonal(#[from] ZonalError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Inconsistent catchment ids: {0}")]
    Consistency(String),
}

impl ExtractionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractionError::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors that must stop the whole call instead of skipping a scene.
    ///
    /// A missing product directory only skips that product.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExtractionError::Config(_) | ExtractionError::Yaml(_))
    }

    /// Write aborted because store columns and catchment order disagree.
    pub fn is_consistency(&self) -> bool {
        match self {
            ExtractionError::Consistency(_) => true,
            ExtractionError::Store(e) => e.is_consistency(),
            _ => false,
        }
    }
}
