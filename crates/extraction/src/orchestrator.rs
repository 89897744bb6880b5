//! Product orchestration: inventory, classification, work set, then
//! transform, extract and write for each scene in ascending order.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, error, info, instrument, warn};

use hydro_common::SceneDateFormat;
use raster_io::RasterLoader;
use ts_store::{append_pair, ExtractionLog, TimeSeriesStore};
use zonal::{extract, CatchmentRegistry, ZonalTable};

use crate::classifier::Classification;
use crate::config::{ExtractorConfig, ProductConfig};
use crate::error::{ExtractionError, ExtractionResult};
use crate::resolver::RecordedScenes;
use crate::scan::{loader_for, ProductScan};
use crate::transform::{analysis_grid, DecodeOptions, SceneRasters};
use crate::variable::Variable;

/// What one scene produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SceneOutcome {
    pub scene_id: String,
    /// Variables whose rows were appended.
    pub written: Vec<String>,
    /// Variables whose write was refused for inconsistent catchment ids.
    pub rejected: Vec<String>,
}

/// Summary of one product run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProductReport {
    pub product: String,
    pub classification: Classification,
    pub work_set: Vec<String>,
    pub scenes: Vec<SceneOutcome>,
    /// Scenes skipped after a decode, transform or write error.
    pub failed: Vec<String>,
    /// Variables excluded because a store header disagrees with the registry.
    pub blocked: Vec<String>,
}

impl ProductReport {
    /// Value rows appended across all variables.
    pub fn rows_written(&self) -> usize {
        self.scenes.iter().map(|s| s.written.len()).sum()
    }
}

/// A variable with both stores open for the run.
struct ActiveVariable {
    variable: Variable,
    values: TimeSeriesStore,
    fractions: TimeSeriesStore,
    recorded: RecordedScenes,
    log: ExtractionLog,
}

pub struct Orchestrator {
    config: ExtractorConfig,
    registry: CatchmentRegistry,
    loader: Option<Arc<dyn RasterLoader>>,
    limit: Option<usize>,
}

impl Orchestrator {
    /// Load the catchment registry named by `config`.
    pub fn new(config: ExtractorConfig) -> ExtractionResult<Self> {
        let source = &config.catchments;
        let registry = CatchmentRegistry::load(&source.path, &source.id_property).map_err(|e| {
            ExtractionError::Config(format!(
                "Cannot load catchments from {}: {}",
                source.path.display(),
                e
            ))
        })?;
        info!(catchments = registry.len(), path = %source.path.display(), "Loaded catchment registry");
        Ok(Self::with_registry(config, registry))
    }

    pub fn with_registry(config: ExtractorConfig, registry: CatchmentRegistry) -> Self {
        Self {
            config,
            registry,
            loader: None,
            limit: None,
        }
    }

    /// Decode every product with `loader` instead of its format decoder.
    pub fn with_loader(mut self, loader: Arc<dyn RasterLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Cap the number of work-set scenes per product and invocation.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn registry(&self) -> &CatchmentRegistry {
        &self.registry
    }

    /// Run one product by name, or every configured product.
    ///
    /// A product that fails with a non-fatal error is logged and the next one
    /// runs; configuration errors stop the call.
    #[instrument(skip(self), fields(catchments = self.registry.len()))]
    pub fn run(&self, product: Option<&str>) -> ExtractionResult<Vec<ProductReport>> {
        let mut reports = Vec::new();
        for product in self.config.select(product)? {
            match self.run_product(product) {
                Ok(report) => reports.push(report),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => error!(product = %product.name, error = %e, "Product run failed"),
            }
        }
        Ok(reports)
    }

    #[instrument(skip(self, product), fields(product = %product.name, kind = %product.kind))]
    pub fn run_product(&self, product: &ProductConfig) -> ExtractionResult<ProductReport> {
        let scan = ProductScan::run(product)?;
        scan.classification.report(&product.name);

        let mut report = ProductReport {
            product: product.name.clone(),
            classification: scan.classification.clone(),
            ..Default::default()
        };

        let catchment_ids = self.registry.ids();
        let mut active = Vec::new();
        for config in &product.variables {
            let variable = Variable::from_config(config, catchment_ids.clone());
            match variable.open_stores() {
                Ok((values, fractions)) => {
                    let recorded = variable.reload()?;
                    let log = ExtractionLog::new(&variable.log);
                    active.push(ActiveVariable {
                        variable,
                        values,
                        fractions,
                        recorded,
                        log,
                    });
                }
                Err(e) if e.is_consistency() => report.blocked.push(variable.name),
                Err(e) => return Err(e),
            }
        }

        let recorded: Vec<RecordedScenes> = active.iter().map(|a| a.recorded.clone()).collect();
        report.work_set = scan.work_set(&recorded, self.limit);
        info!(
            complete = scan.classification.complete.len(),
            work_set = report.work_set.len(),
            variables = active.len(),
            blocked = report.blocked.len(),
            "Resolved work set"
        );
        if report.work_set.is_empty() || active.is_empty() {
            return Ok(report);
        }

        // Removed on every exit path when dropped
        let scratch = self.batch_dir()?;
        let loader = loader_for(&self.loader, &scan.spec);
        let options = DecodeOptions {
            region: product.region,
            nodata: product.nodata,
        };

        for scene_id in &report.work_set {
            let files = scan.inventory.files_for(scene_id);
            let job = SceneJob {
                scene_id,
                files,
                id_width: scan.spec.id_width,
                date_format: scan.spec.date_format,
                scratch: scratch.path(),
            };
            match self.process_scene(&job, loader.as_ref(), options, &mut active) {
                Ok(outcome) => {
                    if !outcome.written.is_empty() {
                        info!(scene = %scene_id, variables = ?outcome.written, "Scene recorded");
                    }
                    report.scenes.push(outcome);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(scene = %scene_id, error = %e, "Scene skipped");
                    report.failed.push(scene_id.clone());
                }
            }
        }

        info!(
            rows = report.rows_written(),
            failed = report.failed.len(),
            "Product run finished"
        );
        Ok(report)
    }

    fn batch_dir(&self) -> ExtractionResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("extract-");
        match &self.config.temp_dir {
            Some(root) => {
                fs::create_dir_all(root).map_err(|e| ExtractionError::io(root, e))?;
                builder.tempdir_in(root).map_err(|e| ExtractionError::io(root, e))
            }
            None => builder
                .tempdir()
                .map_err(|e| ExtractionError::io(std::env::temp_dir(), e)),
        }
    }

    /// Transform, extract and write one scene for every variable still
    /// missing it.
    ///
    /// All analysis grids are built before any row is written, so a decode
    /// failure leaves every store untouched.
    fn process_scene(
        &self,
        job: &SceneJob<'_>,
        loader: &dyn RasterLoader,
        options: DecodeOptions,
        active: &mut [ActiveVariable],
    ) -> ExtractionResult<SceneOutcome> {
        let started = Instant::now();
        let date = job.date_format.parse(job.scene_id)?;
        let mut outcome = SceneOutcome {
            scene_id: job.scene_id.to_string(),
            ..Default::default()
        };

        let pending: Vec<usize> = active
            .iter()
            .enumerate()
            .filter(|(_, a)| !a.recorded.contains(job.scene_id, job.id_width))
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return Ok(outcome);
        }

        let mut scene = SceneRasters::new(loader, job.files.clone(), options);
        let mut tables = Vec::with_capacity(pending.len());
        for &i in &pending {
            let variable = &active[i].variable;
            let grid = analysis_grid(&variable.transform, &mut scene)?;
            let table = extract(&grid, &self.registry, variable.reducer);
            debug!(
                scene = %job.scene_id,
                variable = %variable.name,
                valid_pixels = grid.valid_count(),
                "Extracted analysis grid"
            );
            tables.push((i, table));
        }
        check_table_orders(&tables)?;

        for (i, table) in tables {
            let slot = &mut active[i];
            let debug_file = self.stage_debug(job, &slot.variable.name, &table);

            match append_pair(
                &mut slot.values,
                &mut slot.fractions,
                &table,
                &slot.variable.catchment_ids,
                job.scene_id,
                date,
            ) {
                Ok(()) => {}
                Err(e) if e.is_consistency() => {
                    error!(scene = %job.scene_id, variable = %slot.variable.name, error = %e, "Write refused");
                    outcome.rejected.push(slot.variable.name.clone());
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            if let Err(e) = slot
                .log
                .record(job.scene_id, started.elapsed(), &slot.variable.value_store)
            {
                warn!(log = %slot.log.path().display(), error = %e, "Failed to write extraction log");
            }
            match slot.variable.reload() {
                Ok(recorded) => slot.recorded = recorded,
                Err(e) => warn!(variable = %slot.variable.name, error = %e, "Failed to reload recorded scenes"),
            }
            if let Some(staged) = debug_file {
                self.publish_debug(&staged);
            }
            outcome.written.push(slot.variable.name.clone());
        }

        Ok(outcome)
    }

    /// Write the zonal table into the batch directory when debug output is on.
    fn stage_debug(&self, job: &SceneJob<'_>, variable: &str, table: &ZonalTable) -> Option<PathBuf> {
        self.config.debug_dir.as_ref()?;
        let path = job
            .scratch
            .join(format!("{}_{}.csv", variable, job.scene_id));
        match table.write_csv(&path) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to write debug table");
                None
            }
        }
    }

    /// Copy a staged debug table of a recorded scene into the debug directory.
    fn publish_debug(&self, staged: &Path) {
        let (Some(dir), Some(name)) = (&self.config.debug_dir, staged.file_name()) else {
            return;
        };
        let target = dir.join(name);
        let copied = fs::create_dir_all(dir).and_then(|_| fs::copy(staged, &target));
        if let Err(e) = copied {
            warn!(path = %target.display(), error = %e, "Failed to publish debug table");
        }
    }
}

struct SceneJob<'a> {
    scene_id: &'a str,
    files: Vec<PathBuf>,
    id_width: usize,
    date_format: SceneDateFormat,
    scratch: &'a Path,
}

/// Every table of one scene must list catchments in the same order.
fn check_table_orders(tables: &[(usize, ZonalTable)]) -> ExtractionResult<()> {
    let Some((_, first)) = tables.first() else {
        return Ok(());
    };
    let expected = first.ids();
    for (_, table) in &tables[1..] {
        if let Some(detail) = ts_store::store::column_mismatch(expected.as_slice(), table.ids().as_slice()) {
            return Err(ExtractionError::Consistency(detail));
        }
    }
    Ok(())
}
