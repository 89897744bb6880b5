//! Catchment registry and zonal statistics.
//!
//! Catchments are read from a GeoJSON FeatureCollection whose feature order is
//! the canonical column order of every time-series store. [`extract`] reduces a
//! grid to one value and one valid-pixel fraction per catchment.

pub mod catchments;
pub mod error;
pub mod extract;
pub mod geometry;

pub use catchments::{Catchment, CatchmentRegistry};
pub use error::{ZonalError, ZonalResult};
pub use extract::{extract, format_cell, Reducer, ZonalRecord, ZonalTable};
pub use geometry::{MultiPolygon, Polygon};
