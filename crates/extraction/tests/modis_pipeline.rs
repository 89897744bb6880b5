//! End-to-end runs over a generated MODIS product directory.
//!
//! Tiles are GeoTIFF payloads under MODIS names, decoded through an injected
//! GeoTIFF loader.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use extraction::{ExtractorConfig, Maintainer, Orchestrator};
use raster_io::{FormatLoader, RasterFormat};
use tempfile::TempDir;
use test_utils::{
    assert_row_eq, corrupt_file, store_header, write_catchments, write_modis_scene, CHILE_BASINS,
};

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = test_utils::scratch_dir();
        write_catchments(dir.path(), &CHILE_BASINS, "gauge_id");
        fs::create_dir_all(dir.path().join("raw")).unwrap();
        Self { dir }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn raw(&self) -> PathBuf {
        self.path("raw")
    }

    fn config(&self, debug: bool) -> ExtractorConfig {
        self.config_with(debug, "")
    }

    /// Configuration with `extra` YAML product entries listed first.
    fn config_with(&self, debug: bool, extra: &str) -> ExtractorConfig {
        let root = self.dir.path().display();
        let debug_line = if debug {
            format!("debug_dir: '{}/debug'\n", root)
        } else {
            String::new()
        };
        let yaml = format!(
            "catchments:
  path: '{root}/catchments.geojson'
  id_property: gauge_id
temp_dir: '{root}/tmp'
maintenance_log: '{root}/logs/maintainer.txt'
{debug_line}products:
{extra}  - name: modis_ndvi
    kind: modis
    dir: '{root}/raw'
    variables:
      - name: ndvi
        value_store: '{root}/db/ndvi_mean.csv'
        fraction_store: '{root}/db/ndvi_pc.csv'
        log: '{root}/logs/ndvi.txt'
        transform: {{ type: mosaic }}
"
        );
        ExtractorConfig::from_yaml_str(&yaml).unwrap()
    }

    fn orchestrator(&self, debug: bool) -> Orchestrator {
        Orchestrator::new(self.config(debug))
            .unwrap()
            .with_loader(Arc::new(FormatLoader::new(RasterFormat::GeoTiff)))
    }

    fn lines(&self, rel: &str) -> Vec<String> {
        read_lines(&self.path(rel))
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_incomplete_scene_waits_for_missing_tiles() {
    let ws = Workspace::new();
    write_modis_scene(&ws.raw(), "A2020100", 0..9, 42.0);
    write_modis_scene(&ws.raw(), "A2020108", 0..4, 17.0);
    let orchestrator = ws.orchestrator(false);

    let reports = orchestrator.run(None).unwrap();
    assert_eq!(reports[0].rows_written(), 1);
    assert_eq!(reports[0].classification.incomplete, vec!["A2020108"]);

    let values = ws.lines("db/ndvi_mean.csv");
    assert_eq!(values[0], store_header(&CHILE_BASINS));
    assert_row_eq!(&values[1], "A2020100,2020-04-09,42,42,NA");
    assert_eq!(values.len(), 2);

    // Nothing new: a second pass writes nothing
    let reports = orchestrator.run(None).unwrap();
    assert!(reports[0].work_set.is_empty());
    assert_eq!(reports[0].rows_written(), 0);
    assert_eq!(ws.lines("db/ndvi_mean.csv").len(), 2);

    write_modis_scene(&ws.raw(), "A2020108", 4..9, 17.0);
    let reports = orchestrator.run(Some("modis_ndvi")).unwrap();
    assert_eq!(reports[0].work_set, vec!["A2020108"]);
    assert_eq!(reports[0].rows_written(), 1);

    let values = ws.lines("db/ndvi_mean.csv");
    assert_eq!(values.len(), 3);
    assert_row_eq!(&values[2], "A2020108,2020-04-17,17,17,NA");
}

#[test]
fn test_value_and_fraction_rows_are_paired() {
    let ws = Workspace::new();
    write_modis_scene(&ws.raw(), "A2020100", 0..9, 42.0);

    ws.orchestrator(false).run(None).unwrap();

    let fractions = ws.lines("db/ndvi_pc.csv");
    assert_eq!(fractions.len(), 2);
    assert_row_eq!(&fractions[1], "A2020100,2020-04-09,1000,1000,NA");

    let log = ws.lines("logs/ndvi.txt");
    assert_eq!(log.len(), 1);
    assert!(log[0].starts_with("ID A2020100. Date: "));
}

#[test]
fn test_scenes_are_written_in_ascending_order() {
    let ws = Workspace::new();
    write_modis_scene(&ws.raw(), "A2020116", 0..9, 3.0);
    write_modis_scene(&ws.raw(), "A2020100", 0..9, 1.0);
    write_modis_scene(&ws.raw(), "A2020108", 0..9, 2.0);

    ws.orchestrator(false).run(None).unwrap();

    let ids: Vec<String> = ws.lines("db/ndvi_mean.csv")[1..]
        .iter()
        .map(|l| l.split(',').next().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["A2020100", "A2020108", "A2020116"]);
}

#[test]
fn test_limit_caps_scenes_per_run() {
    let ws = Workspace::new();
    write_modis_scene(&ws.raw(), "A2020100", 0..9, 1.0);
    write_modis_scene(&ws.raw(), "A2020108", 0..9, 2.0);

    let orchestrator = ws.orchestrator(false).with_limit(Some(1));
    let first = orchestrator.run(None).unwrap();
    assert_eq!(first[0].work_set, vec!["A2020100"]);

    let second = orchestrator.run(None).unwrap();
    assert_eq!(second[0].work_set, vec!["A2020108"]);
    assert_eq!(ws.lines("db/ndvi_mean.csv").len(), 3);
}

#[test]
fn test_reordered_store_header_blocks_variable() {
    let ws = Workspace::new();
    write_modis_scene(&ws.raw(), "A2020100", 0..9, 42.0);
    fs::create_dir_all(ws.path("db")).unwrap();
    let reordered = "name_id,date,1002,1001,1003\n";
    fs::write(ws.path("db/ndvi_mean.csv"), reordered).unwrap();

    let reports = ws.orchestrator(false).run(None).unwrap();

    assert_eq!(reports[0].blocked, vec!["ndvi"]);
    assert_eq!(reports[0].rows_written(), 0);
    assert_eq!(
        fs::read_to_string(ws.path("db/ndvi_mean.csv")).unwrap(),
        reordered
    );
}

#[test]
fn test_undecodable_scene_is_skipped() {
    let ws = Workspace::new();
    let tiles = write_modis_scene(&ws.raw(), "A2020100", 0..9, 42.0);
    write_modis_scene(&ws.raw(), "A2020108", 0..9, 17.0);
    corrupt_file(&tiles[4]);

    let reports = ws.orchestrator(false).run(None).unwrap();

    assert_eq!(reports[0].failed, vec!["A2020100"]);
    let values = ws.lines("db/ndvi_mean.csv");
    assert_eq!(values.len(), 2);
    assert_row_eq!(&values[1], "A2020108,2020-04-17,17,17,NA");
    assert_eq!(ws.lines("db/ndvi_pc.csv").len(), 2);
}

#[test]
fn test_debug_tables_published_for_recorded_scenes() {
    let ws = Workspace::new();
    write_modis_scene(&ws.raw(), "A2020100", 0..9, 42.0);

    ws.orchestrator(true).run(None).unwrap();

    let table = ws.lines("debug/ndvi_A2020100.csv");
    assert_eq!(table[0], "id,value,valid_fraction");
    assert_eq!(table[1], "1001,42,1000");
    assert_eq!(table[3], "1003,NA,NA");
    // Batch directories are removed after the run
    assert_eq!(fs::read_dir(ws.path("tmp")).unwrap().count(), 0);
}

#[test]
fn test_maintainer_deletes_unreadable_files() {
    let ws = Workspace::new();
    let tiles = write_modis_scene(&ws.raw(), "A2020100", 0..9, 42.0);
    corrupt_file(&tiles[2]);

    let reports = Maintainer::new(ws.config(false))
        .with_loader(Arc::new(FormatLoader::new(RasterFormat::GeoTiff)))
        .run(None)
        .unwrap();

    assert_eq!(reports[0].checked, 9);
    assert_eq!(reports[0].deleted, vec![tiles[2].clone()]);
    assert!(!tiles[2].exists());
    let log = ws.lines("logs/maintainer.txt");
    assert_eq!(log.len(), 1);
    assert!(log[0].starts_with(&format!("File {} deleted. Date: ", tiles[2].display())));

    // The scene is now incomplete and no longer extracted
    let reports = ws.orchestrator(false).run(None).unwrap();
    assert_eq!(reports[0].classification.incomplete, vec!["A2020100"]);
    assert_eq!(reports[0].rows_written(), 0);
}

#[test]
fn test_maintainer_skips_recorded_scenes() {
    let ws = Workspace::new();
    let tiles = write_modis_scene(&ws.raw(), "A2020100", 0..9, 42.0);
    ws.orchestrator(false).run(None).unwrap();
    corrupt_file(&tiles[0]);

    let reports = Maintainer::new(ws.config(false))
        .with_loader(Arc::new(FormatLoader::new(RasterFormat::GeoTiff)))
        .run(None)
        .unwrap();

    assert_eq!(reports[0].scenes, 0);
    assert!(reports[0].deleted.is_empty());
    assert!(tiles[0].exists());
}

#[cfg(not(feature = "gdal"))]
#[test]
fn test_missing_decoder_never_deletes() {
    let ws = Workspace::new();
    let tiles = write_modis_scene(&ws.raw(), "A2020100", 0..9, 42.0);

    // No loader override: MODIS needs the HDF decoder, which is not built
    let err = Maintainer::new(ws.config(false)).run(None).unwrap_err();

    assert!(err.is_fatal());
    assert!(tiles.iter().all(|t| t.exists()));
    assert!(!ws.path("logs/maintainer.txt").exists());
}

#[test]
fn test_missing_product_directory_skips_only_that_product() {
    let ws = Workspace::new();
    write_modis_scene(&ws.raw(), "A2020100", 0..9, 42.0);
    let root = ws.dir.path().display();
    let unmounted = format!(
        "  - name: modis_lai
    kind: modis
    dir: '{root}/unmounted/MCD15A2H'
    variables:
      - name: lai
        value_store: '{root}/db/lai_mean.csv'
        fraction_store: '{root}/db/lai_pc.csv'
        log: '{root}/logs/lai.txt'
        transform: {{ type: mosaic }}
"
    );
    let config = ws.config_with(false, &unmounted);

    let orchestrator = Orchestrator::new(config.clone())
        .unwrap()
        .with_loader(Arc::new(FormatLoader::new(RasterFormat::GeoTiff)));
    let reports = orchestrator.run(None).unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].product, "modis_ndvi");
    assert_eq!(reports[0].rows_written(), 1);
    assert!(!ws.path("db/lai_mean.csv").exists());

    let reports = Maintainer::new(config)
        .with_loader(Arc::new(FormatLoader::new(RasterFormat::GeoTiff)))
        .run(None)
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].product, "modis_ndvi");
}

#[test]
fn test_status_reports_pending_scenes() {
    let ws = Workspace::new();
    write_modis_scene(&ws.raw(), "A2020100", 0..9, 42.0);
    write_modis_scene(&ws.raw(), "A2020108", 0..9, 17.0);
    let config = ws.config(false);

    let before = extraction::product_status(&config.products[0]).unwrap();
    assert_eq!(before.files, 18);
    assert_eq!(before.pending, 2);
    assert_eq!(before.variables[0].values.records, 0);

    ws.orchestrator(false).with_limit(Some(1)).run(None).unwrap();

    let after = extraction::product_status(&config.products[0]).unwrap();
    assert_eq!(after.pending, 1);
    assert_eq!(after.variables[0].values.records, 1);
    assert_eq!(after.variables[0].fraction_records, 1);
    assert_eq!(after.variables[0].values.last_scene.as_deref(), Some("A2020100"));
}
