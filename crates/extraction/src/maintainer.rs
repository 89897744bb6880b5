//! File maintenance: re-open raw files of pending scenes and delete the ones
//! that cannot be decoded.
//!
//! Only complete scenes that some variable still needs are checked. A decoder
//! that is not compiled in is a configuration error and never leads to a
//! deletion.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use raster_io::RasterLoader;
use ts_store::MaintenanceLog;

use crate::config::{ExtractorConfig, ProductConfig};
use crate::error::{ExtractionError, ExtractionResult};
use crate::resolver::RecordedScenes;
use crate::scan::{loader_for, ProductScan};

#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceReport {
    pub product: String,
    pub scenes: usize,
    pub checked: usize,
    pub deleted: Vec<PathBuf>,
}

pub struct Maintainer {
    config: ExtractorConfig,
    loader: Option<Arc<dyn RasterLoader>>,
    limit: Option<usize>,
    log: MaintenanceLog,
}

impl Maintainer {
    pub fn new(config: ExtractorConfig) -> Self {
        let log = MaintenanceLog::new(&config.maintenance_log);
        Self {
            config,
            loader: None,
            limit: None,
            log,
        }
    }

    /// Probe files with `loader` instead of the product's format decoder.
    pub fn with_loader(mut self, loader: Arc<dyn RasterLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    #[instrument(skip(self))]
    pub fn run(&self, product: Option<&str>) -> ExtractionResult<Vec<MaintenanceReport>> {
        let mut reports = Vec::new();
        for product in self.config.select(product)? {
            match self.run_product(product) {
                Ok(report) => reports.push(report),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => error!(product = %product.name, error = %e, "Maintenance failed"),
            }
        }
        Ok(reports)
    }

    #[instrument(skip(self, product), fields(product = %product.name))]
    pub fn run_product(&self, product: &ProductConfig) -> ExtractionResult<MaintenanceReport> {
        let scan = ProductScan::run(product)?;
        let recorded = product
            .variables
            .iter()
            .map(|v| RecordedScenes::load(&v.value_store))
            .collect::<ExtractionResult<Vec<_>>>()?;
        let scenes = scan.work_set(&recorded, self.limit);
        let loader = loader_for(&self.loader, &scan.spec);

        let mut report = MaintenanceReport {
            product: product.name.clone(),
            scenes: scenes.len(),
            ..Default::default()
        };

        for scene_id in &scenes {
            for path in scan.inventory.files_for(scene_id) {
                report.checked += 1;
                let Err(e) = loader.probe(&path) else {
                    continue;
                };
                if e.is_configuration() {
                    return Err(ExtractionError::Config(format!(
                        "Cannot check {} files: {}",
                        product.name, e
                    )));
                }

                warn!(file = %path.display(), scene = %scene_id, error = %e, "Unreadable raw file");
                if let Err(e) = fs::remove_file(&path) {
                    error!(file = %path.display(), error = %e, "Failed to delete raw file");
                    continue;
                }
                if let Err(e) = self.log.record_deletion(&path) {
                    warn!(log = %self.log.path().display(), error = %e, "Failed to write maintenance log");
                }
                report.deleted.push(path);
            }
        }

        info!(
            scenes = report.scenes,
            checked = report.checked,
            deleted = report.deleted.len(),
            "Maintenance finished"
        );
        Ok(report)
    }
}
