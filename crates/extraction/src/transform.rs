//! Scene rasters to analysis grids.
//!
//! A [`SceneRasters`] holds one scene's file set and decodes each layer at
//! most once, so every variable of a product shares the same decode.
//! [`analysis_grid`] then applies a variable's [`TransformConfig`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use hydro_common::{BoundingBox, GeoTransform, Grid};
use raster_io::RasterLoader;
use zonal::Reducer;

use crate::config::{Rescale, StepSelection, TransformConfig, ValueRange};
use crate::error::{ExtractionError, ExtractionResult};

/// Applied to every grid right after decode.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecodeOptions {
    pub region: Option<BoundingBox>,
    pub nodata: Option<f32>,
}

/// Decoded grids of one scene, cached by layer.
pub struct SceneRasters<'a> {
    loader: &'a dyn RasterLoader,
    files: Vec<PathBuf>,
    options: DecodeOptions,
    /// Per layer: per file, the decoded time steps.
    cache: HashMap<Option<String>, Vec<Vec<Grid>>>,
}

impl<'a> SceneRasters<'a> {
    pub fn new(loader: &'a dyn RasterLoader, files: Vec<PathBuf>, options: DecodeOptions) -> Self {
        Self {
            loader,
            files,
            options,
            cache: HashMap::new(),
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Number of distinct layers decoded so far.
    pub fn decoded_layers(&self) -> usize {
        self.cache.len()
    }

    /// Decoded steps of `layer`, one entry per file.
    pub fn layer(&mut self, layer: Option<&str>) -> ExtractionResult<&[Vec<Grid>]> {
        let key = layer.map(str::to_string);
        if !self.cache.contains_key(&key) {
            let decoded = self.decode(layer)?;
            self.cache.insert(key.clone(), decoded);
        }
        Ok(self.cache.get(&key).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Steps of every file of `layer` in file order, narrowed per file by
    /// `selection`.
    pub fn steps(
        &mut self,
        layer: Option<&str>,
        selection: Option<&StepSelection>,
    ) -> ExtractionResult<Vec<Grid>> {
        let per_file = self.layer(layer)?;
        Ok(match selection {
            Some(sel) => per_file.iter().flat_map(|steps| sel.select(steps)).collect(),
            None => per_file.iter().flatten().cloned().collect(),
        })
    }

    fn decode(&self, layer: Option<&str>) -> ExtractionResult<Vec<Vec<Grid>>> {
        let mut out = Vec::with_capacity(self.files.len());
        for path in &self.files {
            let steps = self.loader.load(path, layer).map_err(|e| {
                warn!(file = %path.display(), layer = ?layer, error = %e, "Failed to decode raster");
                ExtractionError::Raster(e)
            })?;
            out.push(self.prepare(path, steps));
        }
        debug!(files = self.files.len(), layer = ?layer, "Decoded scene layer");
        Ok(out)
    }

    fn prepare(&self, path: &Path, steps: Vec<Grid>) -> Vec<Grid> {
        steps
            .into_iter()
            .filter_map(|mut grid| {
                if let Some(nodata) = self.options.nodata {
                    grid.mask_value(nodata);
                }
                match &self.options.region {
                    Some(region) => {
                        let cropped = grid.crop(region);
                        if cropped.is_none() {
                            debug!(file = %path.display(), "Grid outside region of interest");
                        }
                        cropped
                    }
                    None => Some(grid),
                }
            })
            .collect()
    }
}

/// Build a variable's analysis grid from the scene.
pub fn analysis_grid(
    transform: &TransformConfig,
    scene: &mut SceneRasters<'_>,
) -> ExtractionResult<Grid> {
    match transform {
        TransformConfig::Mosaic {
            layer,
            steps,
            valid_range,
            fill,
            rescale,
        } => {
            let tiles = scene.steps(layer.as_deref(), steps.as_ref())?;
            let grid = mosaic(&tiles)?;
            let grid = filter_range(grid, *valid_range, *fill);
            Ok(apply_rescale(grid, rescale))
        }

        TransformConfig::NormalizedDifference { a, b } => {
            let a_steps = scene.steps(Some(a.as_str()), None)?;
            let b_steps = scene.steps(Some(b.as_str()), None)?;
            if a_steps.len() != b_steps.len() {
                return Err(ExtractionError::Transform(format!(
                    "layers '{}' and '{}' have {} and {} grids",
                    a,
                    b,
                    a_steps.len(),
                    b_steps.len()
                )));
            }
            let tiles = a_steps
                .iter()
                .zip(&b_steps)
                .map(|(ga, gb)| ga.zip_with(gb, normalized_difference))
                .collect::<Result<Vec<_>, _>>()?;
            let grid = mosaic(&tiles)?;
            Ok(grid.map(|v| if (-1000.0..=1000.0).contains(&v) { v } else { f32::NAN }))
        }

        TransformConfig::Accumulate {
            layers,
            steps: selection,
            reducer,
            rescale,
        } => {
            let names: Vec<Option<&str>> = if layers.is_empty() {
                vec![None]
            } else {
                layers.iter().map(|l| Some(l.as_str())).collect()
            };

            let mut total: Option<Grid> = None;
            for name in names {
                let steps = scene.steps(name, selection.as_ref())?;
                let reduced = reduce_steps(&steps, *reducer)?;
                total = Some(match total {
                    Some(acc) => acc.zip_with(&reduced, |x, y| x + y)?,
                    None => reduced,
                });
            }
            let grid = total
                .ok_or_else(|| ExtractionError::Transform("no layers to accumulate".into()))?;
            Ok(apply_rescale(grid, rescale))
        }

        TransformConfig::EventLength {
            layer,
            steps: selection,
            depth_factor,
            threshold,
            group,
            interval_hours,
            rescale,
        } => {
            let steps = scene.steps(layer.as_deref(), selection.as_ref())?;
            let grid = event_length(
                &steps,
                *depth_factor,
                *threshold,
                *group,
                *interval_hours,
            )?;
            Ok(apply_rescale(grid, rescale))
        }

        TransformConfig::ClassFraction {
            layer,
            class,
            scale,
        } => {
            let tiles = scene.steps(layer.as_deref(), None)?;
            let grid = mosaic(&tiles)?;
            let (class, scale) = (*class, *scale as f32);
            Ok(grid.map(|v| if v == class { scale } else { 0.0 }))
        }
    }
}

fn normalized_difference(a: f32, b: f32) -> f32 {
    let sum = a + b;
    if sum == 0.0 || sum.is_nan() {
        f32::NAN
    } else {
        1000.0 * (a - b) / sum
    }
}

fn filter_range(grid: Grid, range: Option<ValueRange>, fill: Option<f32>) -> Grid {
    if range.is_none() && fill.is_none() {
        return grid;
    }
    let replacement = fill.unwrap_or(f32::NAN);
    let data = grid
        .data
        .iter()
        .map(|&v| {
            let valid = !v.is_nan() && range.map_or(true, |r| r.contains(v));
            if valid {
                v
            } else {
                replacement
            }
        })
        .collect();
    Grid { data, ..grid }
}

fn apply_rescale(grid: Grid, rescale: &Rescale) -> Grid {
    if rescale.is_identity() {
        grid
    } else {
        grid.map(|v| rescale.apply(v))
    }
}

/// Combine tiles into one grid; the first valid value wins where they overlap.
///
/// Tiles must share pixel size and be north-up.
pub fn mosaic(tiles: &[Grid]) -> ExtractionResult<Grid> {
    let first = tiles
        .first()
        .ok_or_else(|| ExtractionError::Transform("no grids to mosaic".into()))?;
    if tiles.len() == 1 {
        return Ok(first.clone());
    }

    let t0 = first.transform;
    if t0.pixel_width <= 0.0 || t0.pixel_height >= 0.0 {
        return Err(ExtractionError::Transform(
            "mosaic needs north-up grids".into(),
        ));
    }
    if let Some(odd) = tiles.iter().find(|t| !t.transform.same_resolution(&t0)) {
        return Err(ExtractionError::Transform(format!(
            "tile resolution {}x{} differs from {}x{}",
            odd.transform.pixel_width,
            odd.transform.pixel_height,
            t0.pixel_width,
            t0.pixel_height
        )));
    }

    let extent = tiles
        .iter()
        .skip(1)
        .fold(first.bbox(), |acc, t| acc.union(&t.bbox()));
    let (pw, ph) = (t0.pixel_width, -t0.pixel_height);
    let width = (extent.width() / pw).round() as usize;
    let height = (extent.height() / ph).round() as usize;
    let mut out = Grid::filled(
        width,
        height,
        GeoTransform::new(extent.min_x, extent.max_y, t0.pixel_width, t0.pixel_height),
        f32::NAN,
    );

    for tile in tiles {
        let col0 = ((tile.transform.origin_x - extent.min_x) / pw).round() as usize;
        let row0 = ((extent.max_y - tile.transform.origin_y) / ph).round() as usize;
        for row in 0..tile.height {
            let out_row = row0 + row;
            if out_row >= height {
                break;
            }
            for col in 0..tile.width {
                let out_col = col0 + col;
                if out_col >= width {
                    break;
                }
                let v = tile.data[row * tile.width + col];
                let slot = &mut out.data[out_row * width + out_col];
                if slot.is_nan() && !v.is_nan() {
                    *slot = v;
                }
            }
        }
    }

    debug!(tiles = tiles.len(), width, height, "Mosaicked tiles");
    Ok(out)
}

/// Per-pixel reduction over aligned steps, ignoring missing values.
///
/// A pixel missing in every step stays missing.
pub fn reduce_steps(steps: &[Grid], reducer: Reducer) -> ExtractionResult<Grid> {
    let first = steps
        .first()
        .ok_or_else(|| ExtractionError::Transform("no time steps to reduce".into()))?;
    if steps.iter().any(|s| !s.is_aligned_with(first)) {
        return Err(ExtractionError::Transform(
            "time steps are not on the same grid".into(),
        ));
    }

    let mut buf = Vec::with_capacity(steps.len());
    let data = (0..first.len())
        .map(|i| {
            buf.clear();
            buf.extend(
                steps
                    .iter()
                    .map(|s| s.data[i])
                    .filter(|v| !v.is_nan())
                    .map(f64::from),
            );
            reducer.apply(&buf).map_or(f32::NAN, |v| v as f32)
        })
        .collect();
    Ok(Grid {
        data,
        ..first.clone()
    })
}

/// Hours per pixel during which the depth exceeded `threshold`.
fn event_length(
    steps: &[Grid],
    depth_factor: f64,
    threshold: f64,
    group: usize,
    interval_hours: f64,
) -> ExtractionResult<Grid> {
    let intervals = steps
        .chunks(group.max(1))
        .map(|chunk| reduce_steps(chunk, Reducer::Sum))
        .collect::<ExtractionResult<Vec<Grid>>>()?;
    let first = intervals
        .first()
        .ok_or_else(|| ExtractionError::Transform("no time steps for event length".into()))?;
    if intervals.iter().any(|g| !g.is_aligned_with(first)) {
        return Err(ExtractionError::Transform(
            "time steps are not on the same grid".into(),
        ));
    }

    let data = (0..first.len())
        .map(|i| {
            let mut seen = false;
            let mut events = 0u32;
            for g in &intervals {
                let v = g.data[i];
                if v.is_nan() {
                    continue;
                }
                seen = true;
                if f64::from(v) * depth_factor > threshold {
                    events += 1;
                }
            }
            if seen {
                (f64::from(events) * interval_hours) as f32
            } else {
                f32::NAN
            }
        })
        .collect();
    Ok(Grid {
        data,
        ..first.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster_io::{RasterError, RasterResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_utils::assert_approx_eq;

    /// Serves pre-built grids keyed by file name and layer.
    struct MapLoader {
        grids: HashMap<(String, Option<String>), Vec<Grid>>,
        loads: AtomicUsize,
    }

    impl MapLoader {
        fn new(entries: Vec<(&str, Option<&str>, Vec<Grid>)>) -> Self {
            Self {
                grids: entries
                    .into_iter()
                    .map(|(f, l, g)| ((f.to_string(), l.map(str::to_string)), g))
                    .collect(),
                loads: AtomicUsize::new(0),
            }
        }
    }

    impl RasterLoader for MapLoader {
        fn load(&self, path: &Path, layer: Option<&str>) -> RasterResult<Vec<Grid>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let key = (
                path.file_name().unwrap().to_string_lossy().to_string(),
                layer.map(str::to_string),
            );
            self.grids
                .get(&key)
                .cloned()
                .ok_or_else(|| RasterError::MissingData(format!("{:?}", key)))
        }

        fn probe(&self, _path: &Path) -> RasterResult<()> {
            Ok(())
        }
    }

    fn grid(x0: f64, y0: f64, w: usize, h: usize, data: Vec<f32>) -> Grid {
        Grid::new(w, h, GeoTransform::new(x0, y0, 1.0, -1.0), data).unwrap()
    }

    fn files(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/raw").join(n)).collect()
    }

    #[test]
    fn test_mosaic_side_by_side() {
        let left = grid(0.0, 2.0, 1, 2, vec![1.0, 2.0]);
        let right = grid(1.0, 2.0, 1, 2, vec![3.0, f32::NAN]);
        let m = mosaic(&[left, right]).unwrap();
        assert_eq!((m.width, m.height), (2, 2));
        assert_eq!(m.data[..3], [1.0, 3.0, 2.0]);
        assert!(m.data[3].is_nan());
    }

    #[test]
    fn test_mosaic_first_valid_wins() {
        let a = grid(0.0, 1.0, 2, 1, vec![f32::NAN, 5.0]);
        let b = grid(0.0, 1.0, 2, 1, vec![7.0, 9.0]);
        let m = mosaic(&[a, b]).unwrap();
        assert_eq!(m.data, vec![7.0, 5.0]);
    }

    #[test]
    fn test_mosaic_rejects_mixed_resolution() {
        let a = grid(0.0, 1.0, 1, 1, vec![1.0]);
        let b = Grid::new(1, 1, GeoTransform::new(1.0, 1.0, 0.5, -0.5), vec![1.0]).unwrap();
        assert!(matches!(mosaic(&[a, b]), Err(ExtractionError::Transform(_))));
    }

    #[test]
    fn test_mosaic_with_range_fill_and_rescale() {
        let loader = MapLoader::new(vec![(
            "t.hdf",
            Some("Lai"),
            vec![grid(0.0, 1.0, 3, 1, vec![20.0, 250.0, f32::NAN])],
        )]);
        let mut scene = SceneRasters::new(&loader, files(&["t.hdf"]), DecodeOptions::default());
        let t = TransformConfig::Mosaic {
            layer: Some("Lai".into()),
            steps: None,
            valid_range: Some(ValueRange { min: None, max: Some(100.0) }),
            fill: Some(0.0),
            rescale: Rescale { offset: 0.0, scale: 10.0 },
        };
        let g = analysis_grid(&t, &mut scene).unwrap();
        assert_eq!(g.data, vec![200.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalized_difference_clips() {
        let loader = MapLoader::new(vec![
            ("t.hdf", Some("nir"), vec![grid(0.0, 1.0, 3, 1, vec![3.0, 5.0, 0.0])]),
            ("t.hdf", Some("swir"), vec![grid(0.0, 1.0, 3, 1, vec![1.0, -6.0, 0.0])]),
        ]);
        let mut scene = SceneRasters::new(&loader, files(&["t.hdf"]), DecodeOptions::default());
        let t = TransformConfig::NormalizedDifference {
            a: "nir".into(),
            b: "swir".into(),
        };
        let g = analysis_grid(&t, &mut scene).unwrap();
        assert_eq!(g.data[0], 500.0);
        // 1000 * 11 / -1 is far outside the valid range
        assert!(g.data[1].is_nan());
        assert!(g.data[2].is_nan());
    }

    #[test]
    fn test_accumulate_sums_layer_means() {
        let loader = MapLoader::new(vec![
            ("a.nc4", Some("top"), vec![grid(0.0, 1.0, 1, 1, vec![0.2])]),
            ("b.nc4", Some("top"), vec![grid(0.0, 1.0, 1, 1, vec![0.4])]),
            ("a.nc4", Some("deep"), vec![grid(0.0, 1.0, 1, 1, vec![1.0])]),
            ("b.nc4", Some("deep"), vec![grid(0.0, 1.0, 1, 1, vec![f32::NAN])]),
        ]);
        let mut scene =
            SceneRasters::new(&loader, files(&["a.nc4", "b.nc4"]), DecodeOptions::default());
        let t = TransformConfig::Accumulate {
            layers: vec!["top".into(), "deep".into()],
            steps: None,
            reducer: Reducer::Mean,
            rescale: Rescale { offset: 0.0, scale: 100.0 },
        };
        let g = analysis_grid(&t, &mut scene).unwrap();
        assert_approx_eq!(g.data[0], 130.0, 1e-3);
    }

    #[test]
    fn test_accumulate_selects_one_level() {
        // (time, level) flattened: t0/1000, t0/500, t1/1000, t1/500
        let steps = [280.0, 250.0, 282.0, 252.0]
            .iter()
            .map(|&v| grid(0.0, 1.0, 1, 1, vec![v]))
            .collect();
        let loader = MapLoader::new(vec![("era5.nc", Some("t"), steps)]);
        let mut scene = SceneRasters::new(&loader, files(&["era5.nc"]), DecodeOptions::default());
        let t = TransformConfig::Accumulate {
            layers: vec!["t".into()],
            steps: Some(StepSelection { start: 1, stride: 2, count: None }),
            reducer: Reducer::Mean,
            rescale: Rescale::default(),
        };
        let g = analysis_grid(&t, &mut scene).unwrap();
        assert_approx_eq!(g.data[0], 251.0);

        let all = TransformConfig::Accumulate {
            layers: vec!["t".into()],
            steps: None,
            reducer: Reducer::Mean,
            rescale: Rescale::default(),
        };
        assert_approx_eq!(analysis_grid(&all, &mut scene).unwrap().data[0], 266.0);
    }

    #[test]
    fn test_selection_applies_per_file() {
        let loader = MapLoader::new(vec![
            (
                "a.nc",
                None,
                vec![grid(0.0, 1.0, 1, 1, vec![1.0]), grid(0.0, 1.0, 1, 1, vec![10.0])],
            ),
            (
                "b.nc",
                None,
                vec![grid(0.0, 1.0, 1, 1, vec![2.0]), grid(0.0, 1.0, 1, 1, vec![20.0])],
            ),
        ]);
        let mut scene = SceneRasters::new(&loader, files(&["a.nc", "b.nc"]), DecodeOptions::default());
        let second = StepSelection { start: 1, stride: 1, count: None };
        let picked = scene.steps(None, Some(&second)).unwrap();
        let values: Vec<f32> = picked.iter().map(|g| g.data[0]).collect();
        assert_eq!(values, vec![10.0, 20.0]);
        assert_eq!(scene.steps(None, None).unwrap().len(), 4);
    }

    #[test]
    fn test_gfs_lead_day_windows() {
        // Five days of 3-hourly steps; every step of day d holds d + 1
        let run: Vec<Grid> = (0..40)
            .map(|i| grid(0.0, 1.0, 1, 1, vec![(i / 8 + 1) as f32]))
            .collect();
        let loader = MapLoader::new(vec![("gfs_prec_2024010100.nc", Some("APCP_surface"), run)]);
        let mut scene = SceneRasters::new(
            &loader,
            files(&["gfs_prec_2024010100.nc"]),
            DecodeOptions::default(),
        );
        for day in 0..5 {
            let t = TransformConfig::Accumulate {
                layers: vec!["APCP_surface".into()],
                steps: Some(StepSelection { start: 8 * day, stride: 1, count: Some(8) }),
                reducer: Reducer::Sum,
                rescale: Rescale::default(),
            };
            let g = analysis_grid(&t, &mut scene).unwrap();
            assert_approx_eq!(g.data[0], 8.0 * (day + 1) as f32);
        }
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_accumulate_all_missing_stays_missing() {
        let steps = vec![
            grid(0.0, 1.0, 2, 1, vec![1.0, f32::NAN]),
            grid(0.0, 1.0, 2, 1, vec![2.0, f32::NAN]),
        ];
        let g = reduce_steps(&steps, Reducer::Sum).unwrap();
        assert_eq!(g.data[0], 3.0);
        assert!(g.data[1].is_nan());
    }

    #[test]
    fn test_event_length_counts_intervals() {
        // Depth in mm from m/s over three hours
        let steps: Vec<Grid> = [0.001, 0.0, 0.002, 0.0005]
            .iter()
            .map(|&v| grid(0.0, 1.0, 1, 1, vec![v]))
            .collect();
        let g = event_length(&steps, 10800.0, 10.0, 1, 3.0).unwrap();
        assert_eq!(g.data, vec![6.0]);

        // Pairs summed: (0.001 + 0.0) and (0.002 + 0.0005)
        let g = event_length(&steps, 10800.0, 10.0, 2, 6.0).unwrap();
        assert_eq!(g.data, vec![12.0]);
    }

    #[test]
    fn test_class_fraction() {
        let loader = MapLoader::new(vec![(
            "lc.tif",
            None,
            vec![grid(0.0, 1.0, 3, 1, vec![12.0, 4.0, f32::NAN])],
        )]);
        let mut scene = SceneRasters::new(&loader, files(&["lc.tif"]), DecodeOptions::default());
        let t = TransformConfig::ClassFraction {
            layer: None,
            class: 12.0,
            scale: 1000.0,
        };
        let g = analysis_grid(&t, &mut scene).unwrap();
        assert_eq!(g.data[..2], [1000.0, 0.0]);
        assert!(g.data[2].is_nan());
    }

    #[test]
    fn test_layer_decoded_once() {
        let loader = MapLoader::new(vec![(
            "t.hdf",
            Some("ndvi"),
            vec![grid(0.0, 1.0, 1, 1, vec![1.0])],
        )]);
        let mut scene = SceneRasters::new(&loader, files(&["t.hdf"]), DecodeOptions::default());
        let t = TransformConfig::Mosaic {
            layer: Some("ndvi".into()),
            steps: None,
            valid_range: None,
            fill: None,
            rescale: Rescale::default(),
        };
        analysis_grid(&t, &mut scene).unwrap();
        analysis_grid(&t, &mut scene).unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(scene.decoded_layers(), 1);
    }

    #[test]
    fn test_nodata_and_region_applied_on_decode() {
        let loader = MapLoader::new(vec![(
            "p.bin",
            None,
            vec![grid(0.0, 2.0, 2, 2, vec![-9999.0, 1.0, 2.0, 3.0])],
        )]);
        let options = DecodeOptions {
            region: Some(BoundingBox::new(0.0, 1.0, 2.0, 2.0)),
            nodata: Some(-9999.0),
        };
        let mut scene = SceneRasters::new(&loader, files(&["p.bin"]), options);
        let steps = scene.steps(None, None).unwrap();
        assert_eq!((steps[0].width, steps[0].height), (2, 1));
        assert!(steps[0].data[0].is_nan());
        assert_eq!(steps[0].data[1], 1.0);
    }

    #[test]
    fn test_decode_failure_propagates() {
        let loader = MapLoader::new(vec![]);
        let mut scene = SceneRasters::new(&loader, files(&["gone.hdf"]), DecodeOptions::default());
        assert!(matches!(scene.steps(None, None), Err(ExtractionError::Raster(_))));
    }
}
