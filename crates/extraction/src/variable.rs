//! A variable: one named quantity bound to a value store and a valid-fraction
//! store over an ordered catchment set.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, warn};

use ts_store::store::duplicate_scenes;
use ts_store::{StoreSummary, TimeSeriesStore};
use zonal::Reducer;

use crate::config::{TransformConfig, VariableConfig};
use crate::error::{ExtractionError, ExtractionResult};
use crate::resolver::{has_content, RecordedScenes};

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub value_store: PathBuf,
    pub fraction_store: PathBuf,
    pub log: PathBuf,
    pub transform: TransformConfig,
    pub reducer: Reducer,
    /// Canonical column order.
    pub catchment_ids: Vec<String>,
}

/// Record counts of both stores.
#[derive(Debug, Clone, Serialize)]
pub struct VariableSummary {
    pub name: String,
    pub values: StoreSummary,
    pub fraction_records: usize,
}

impl Variable {
    pub fn from_config(config: &VariableConfig, catchment_ids: Vec<String>) -> Self {
        Self {
            name: config.name.clone(),
            value_store: config.value_store.clone(),
            fraction_store: config.fraction_store.clone(),
            log: config.log.clone(),
            transform: config.transform.clone(),
            reducer: config.reducer,
            catchment_ids,
        }
    }

    /// Open both stores, creating missing ones, and check their headers
    /// against the catchment order.
    pub fn open_stores(&self) -> ExtractionResult<(TimeSeriesStore, TimeSeriesStore)> {
        let values = TimeSeriesStore::open_or_create(&self.value_store, &self.catchment_ids)?;
        let fractions = TimeSeriesStore::open_or_create(&self.fraction_store, &self.catchment_ids)?;

        for store in [&values, &fractions] {
            if let Err(e) = store.check_columns(self.catchment_ids.as_slice()) {
                error!(variable = %self.name, store = %store.path().display(), error = %e, "Store header disagrees with catchment registry");
                return Err(ExtractionError::Store(e));
            }
            let duplicates = duplicate_scenes(store);
            if !duplicates.is_empty() {
                warn!(store = %store.path().display(), scenes = ?duplicates, "Store holds repeated scenes");
            }
        }
        Ok((values, fractions))
    }

    /// Re-read the scenes recorded in the value store.
    pub fn reload(&self) -> ExtractionResult<RecordedScenes> {
        RecordedScenes::load(&self.value_store)
    }

    pub fn summary(&self) -> ExtractionResult<VariableSummary> {
        let values = if has_content(&self.value_store) {
            TimeSeriesStore::open(&self.value_store)?.summary()
        } else {
            StoreSummary {
                records: 0,
                first_scene: None,
                last_scene: None,
                valid_share: Vec::new(),
            }
        };
        let fraction_records = if has_content(&self.fraction_store) {
            TimeSeriesStore::open(&self.fraction_store)?.rows().len()
        } else {
            0
        };
        Ok(VariableSummary {
            name: self.name.clone(),
            values,
            fraction_records,
        })
    }
}
