//! Incremental extraction of per-catchment time series from raster products.
//!
//! # Pipeline
//!
//! For each configured product:
//!
//! 1. [`Inventory`] lists the raw files and tags them with scene ids
//! 2. [`classify`] keeps the scenes holding exactly the expected file count
//! 3. [`work_set`] subtracts the scenes each variable already recorded
//! 4. [`analysis_grid`] turns a scene's rasters into one grid per variable
//! 5. `zonal::extract` reduces it per catchment and `ts_store::append_pair`
//!    appends the value and valid-fraction rows together
//!
//! [`Maintainer`] runs independently and deletes raw files of pending scenes
//! that cannot be decoded.

pub mod classifier;
pub mod config;
pub mod error;
pub mod inventory;
pub mod maintainer;
pub mod metadata;
pub mod orchestrator;
pub mod product;
pub mod resolver;
pub mod scan;
pub mod transform;
pub mod variable;

pub use classifier::{classify, Classification};
pub use config::{
    CatchmentSource, ExtractorConfig, ProductConfig, Rescale, StepSelection, TransformConfig,
    ValueRange, VariableConfig,
};
pub use error::{ExtractionError, ExtractionResult};
pub use inventory::{Inventory, SceneFile};
pub use maintainer::{MaintenanceReport, Maintainer};
pub use orchestrator::{Orchestrator, ProductReport, SceneOutcome};
pub use product::{ProductKind, ProductSpec};
pub use resolver::{job_work_set, work_set, RecordedScenes};
pub use scan::{product_status, ProductScan, ProductStatus};
pub use transform::{analysis_grid, mosaic, DecodeOptions, SceneRasters};
pub use variable::{Variable, VariableSummary};
