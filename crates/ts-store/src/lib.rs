//! Per-catchment time-series stores.
//!
//! A store is a comma-separated file with one row per scene and one column per
//! catchment. Each variable owns two stores: aggregated values and valid-pixel
//! fractions (thousandths), always appended together by [`append_pair`].

pub mod error;
pub mod logs;
pub mod store;
pub mod writer;

pub use error::{StoreError, StoreResult};
pub use logs::{ExtractionLog, MaintenanceLog};
pub use store::{StoreRow, StoreSummary, TimeSeriesStore};
pub use writer::{append_extraction, append_pair, Column};
