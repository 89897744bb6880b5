//! Error types for the catchment registry and zonal extraction.

use thiserror::Error;

/// Result type alias using ZonalError.
pub type ZonalResult<T> = Result<T, ZonalError>;

#[derive(Debug, Error)]
pub enum ZonalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feature {index} has no '{property}' property")]
    MissingId { index: usize, property: String },

    #[error("Duplicate catchment id '{0}'")]
    DuplicateId(String),

    #[error("Catchment '{id}' has unsupported geometry: {reason}")]
    InvalidGeometry { id: String, reason: String },

    #[error("Catchment registry is empty")]
    Empty,
}
