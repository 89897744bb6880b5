//! Shared test utilities for the catchment time-series workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Catchment GeoJSON fixtures
//! - Raw scene file generators (GeoTIFF tiles, PERSIANN binaries)
//! - Approximate equality assertions
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in integration tests under `tests/`:
//!
//! ```ignore
//! use test_utils::{fixtures, generators, assert_approx_eq};
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::*;
pub use generators::*;

/// Create a scratch directory removed when the handle is dropped.
pub fn scratch_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("failed to create scratch directory")
}

/// Macro for approximate floating-point equality assertions.
///
/// The tolerance defaults to `1e-6`.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// assert_approx_eq!(0.1_f32 + 0.2_f32, 0.3_f32);     // passes
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr) => {
        $crate::assert_approx_eq!($left, $right, 1e-6)
    };
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Assert that two lines of a CSV store hold the same cells.
///
/// ```ignore
/// assert_row_eq!(lines[1], "A2020100,2020-04-09,12,NA");
/// ```
#[macro_export]
macro_rules! assert_row_eq {
    ($line:expr, $expected:expr) => {{
        let line: &str = $line;
        let expected: &str = $expected;
        let got: Vec<&str> = line.trim_end().split(',').collect();
        let want: Vec<&str> = expected.split(',').collect();
        assert_eq!(got, want, "store row mismatch");
    }};
}
