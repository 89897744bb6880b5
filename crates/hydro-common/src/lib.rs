//! Common types shared across the catchment time-series workspace.

pub mod bbox;
pub mod error;
pub mod grid;
pub mod time;

pub use bbox::BoundingBox;
pub use error::{CommonError, CommonResult};
pub use grid::{GeoTransform, Grid};
pub use time::SceneDateFormat;
