//! Error types for raster decoding.

use thiserror::Error;

/// Result type for raster decoding operations.
pub type RasterResult<T> = Result<T, RasterError>;

/// Errors raised while opening or decoding a raster file.
#[derive(Error, Debug)]
pub enum RasterError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF container error
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Missing required variable, layer or tag
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Structurally invalid content
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Grid could not be built from decoded data
    #[error("Grid error: {0}")]
    Grid(#[from] hydro_common::CommonError),

    /// The format is known but its backend was not compiled in
    #[error("{format} support is not enabled (build with feature '{feature}')")]
    FeatureDisabled {
        format: &'static str,
        feature: &'static str,
    },
}

impl RasterError {
    /// True when the error describes the build, not the file.
    ///
    /// Integrity sweeps must not treat these as corrupt files.
    pub fn is_configuration(&self) -> bool {
        matches!(self, RasterError::FeatureDisabled { .. })
    }
}
