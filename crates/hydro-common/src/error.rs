//! Error types for the shared grid and date helpers.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised by grid construction, grid arithmetic and date parsing.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("grid data length {actual} does not match {width}x{height}")]
    DataLength {
        width: usize,
        height: usize,
        actual: usize,
    },

    #[error("grid shapes differ: {left} vs {right}")]
    ShapeMismatch { left: String, right: String },

    #[error("invalid scene date '{value}' for format {format}")]
    InvalidDate { value: String, format: String },
}
