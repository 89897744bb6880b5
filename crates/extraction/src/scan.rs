//! One product's inventory and classification, shared by extraction, file
//! maintenance and status reporting.

use std::sync::Arc;

use serde::Serialize;

use raster_io::{FormatLoader, RasterFormat, RasterLoader};

use crate::classifier::{classify, Classification};
use crate::config::ProductConfig;
use crate::error::ExtractionResult;
use crate::inventory::Inventory;
use crate::product::{ProductKind, ProductSpec};
use crate::resolver::{job_work_set, RecordedScenes};
use crate::variable::{Variable, VariableSummary};

#[derive(Debug, Clone)]
pub struct ProductScan {
    pub spec: ProductSpec,
    pub inventory: Inventory,
    pub classification: Classification,
}

impl ProductScan {
    pub fn run(product: &ProductConfig) -> ExtractionResult<Self> {
        let spec = product.spec();
        let inventory = Inventory::scan(&product.dir, &spec, product.variable.as_deref())?;
        let classification = classify(inventory.scene_ids(), spec.expected_files);
        Ok(Self {
            spec,
            inventory,
            classification,
        })
    }

    /// Complete scenes missing from at least one store, capped at `limit`.
    pub fn work_set(&self, recorded: &[RecordedScenes], limit: Option<usize>) -> Vec<String> {
        let mut scenes = job_work_set(&self.classification.complete, recorded, self.spec.id_width);
        if let Some(limit) = limit {
            scenes.truncate(limit);
        }
        scenes
    }
}

/// Loader override, or the product's format decoder.
pub(crate) fn loader_for(
    overridden: &Option<Arc<dyn RasterLoader>>,
    spec: &ProductSpec,
) -> Arc<dyn RasterLoader> {
    match overridden {
        Some(loader) => Arc::clone(loader),
        None => Arc::new(FormatLoader::new(spec.format)),
    }
}

/// Inventory and store state of one product.
#[derive(Debug, Clone, Serialize)]
pub struct ProductStatus {
    pub name: String,
    pub kind: ProductKind,
    pub format: RasterFormat,
    /// False when the format's decoder was not compiled in.
    pub decoder_available: bool,
    pub files: usize,
    pub classification: Classification,
    /// Complete scenes still missing from some store.
    pub pending: usize,
    pub variables: Vec<VariableSummary>,
}

pub fn product_status(product: &ProductConfig) -> ExtractionResult<ProductStatus> {
    let scan = ProductScan::run(product)?;

    let variables: Vec<Variable> = product
        .variables
        .iter()
        .map(|v| Variable::from_config(v, Vec::new()))
        .collect();
    let recorded = variables
        .iter()
        .map(Variable::reload)
        .collect::<ExtractionResult<Vec<_>>>()?;
    let summaries = variables
        .iter()
        .map(Variable::summary)
        .collect::<ExtractionResult<Vec<_>>>()?;

    Ok(ProductStatus {
        name: product.name.clone(),
        kind: product.kind,
        format: scan.spec.format,
        decoder_available: scan.spec.format.is_available(),
        files: scan.inventory.len(),
        pending: scan.work_set(&recorded, None).len(),
        classification: scan.classification,
        variables: summaries,
    })
}
