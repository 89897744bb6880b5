//! Zonal statistics: one aggregate value and one valid-pixel fraction per
//! catchment.
//!
//! A pixel belongs to a catchment when its centre lies inside the footprint.
//! Catchments too small to contain any pixel centre fall back to the pixel
//! under their representative point. Values are rounded to integers; the
//! valid fraction is expressed in thousandths.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use hydro_common::{BoundingBox, Grid};

use crate::catchments::{Catchment, CatchmentRegistry};
use crate::error::ZonalResult;

/// Aggregate applied to a catchment's valid pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    #[default]
    Mean,
    Sum,
    Min,
    Max,
}

impl Reducer {
    /// Reduce the given values, `None` when empty.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let v = match self {
            Reducer::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Reducer::Sum => values.iter().sum(),
            Reducer::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Reducer::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        Some(v)
    }
}

/// Result for one catchment. `None` is written as `NA`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZonalRecord {
    pub id: String,
    pub value: Option<i64>,
    pub valid_fraction: Option<i64>,
}

/// Extraction output in registry order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ZonalTable {
    pub records: Vec<ZonalRecord>,
}

impl ZonalTable {
    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }

    pub fn values(&self) -> Vec<Option<i64>> {
        self.records.iter().map(|r| r.value).collect()
    }

    pub fn fractions(&self) -> Vec<Option<i64>> {
        self.records.iter().map(|r| r.valid_fraction).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Render as CSV with `id,value,valid_fraction` columns.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("id,value,valid_fraction\n");
        for r in &self.records {
            let _ = writeln!(
                out,
                "{},{},{}",
                r.id,
                format_cell(r.value),
                format_cell(r.valid_fraction)
            );
        }
        out
    }

    /// Write the CSV rendering to `path`, creating parent directories.
    pub fn write_csv(&self, path: &Path) -> ZonalResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_csv())?;
        Ok(())
    }
}

/// Store cell rendering: the integer, or `NA` when missing.
pub fn format_cell(v: Option<i64>) -> String {
    match v {
        Some(v) => v.to_string(),
        None => "NA".to_string(),
    }
}

/// Reduce `grid` over every catchment of `registry`.
pub fn extract(grid: &Grid, registry: &CatchmentRegistry, reducer: Reducer) -> ZonalTable {
    let records: Vec<ZonalRecord> = registry
        .catchments()
        .iter()
        .map(|c| extract_one(grid, c, reducer))
        .collect();

    debug!(
        catchments = records.len(),
        with_value = records.iter().filter(|r| r.value.is_some()).count(),
        reducer = ?reducer,
        "Zonal extraction complete"
    );
    ZonalTable { records }
}

fn extract_one(grid: &Grid, catchment: &Catchment, reducer: Reducer) -> ZonalRecord {
    let pixels = catchment_pixels(grid, catchment);

    let values: Vec<f64> = pixels
        .iter()
        .filter_map(|&(col, row)| grid.get(col, row))
        .map(f64::from)
        .collect();

    let valid_fraction = if pixels.is_empty() {
        None
    } else {
        Some(round(values.len() as f64 / pixels.len() as f64 * 1000.0))
    };

    ZonalRecord {
        id: catchment.id.clone(),
        value: reducer.apply(&values).map(round),
        valid_fraction,
    }
}

/// Pixels assigned to a catchment.
pub fn catchment_pixels(grid: &Grid, catchment: &Catchment) -> Vec<(usize, usize)> {
    let geometry = &catchment.geometry;
    let mut pixels = Vec::new();

    if let Some(bbox) = geometry.bbox() {
        if let Some((c0, c1, r0, r1)) = pixel_window(grid, bbox) {
            for row in r0..=r1 {
                for col in c0..=c1 {
                    let (x, y) = grid.transform.cell_center(col, row);
                    if geometry.contains_point(x, y) {
                        pixels.push((col, row));
                    }
                }
            }
        }
    }

    if pixels.is_empty() {
        if let Some(p) = geometry
            .representative_point()
            .and_then(|(x, y)| grid.pixel_at(x, y))
        {
            pixels.push(p);
        }
    }
    pixels
}

/// Inclusive column and row range of pixels overlapping `bbox`.
fn pixel_window(grid: &Grid, bbox: BoundingBox) -> Option<(usize, usize, usize, usize)> {
    let t = &grid.transform;
    let (ax, ay) = t.geo_to_pixel(bbox.min_x, bbox.min_y);
    let (bx, by) = t.geo_to_pixel(bbox.max_x, bbox.max_y);
    let (col_lo, col_hi) = (ax.min(bx).floor(), ax.max(bx).floor());
    let (row_lo, row_hi) = (ay.min(by).floor(), ay.max(by).floor());

    if grid.width == 0
        || grid.height == 0
        || col_hi < 0.0
        || row_hi < 0.0
        || col_lo >= grid.width as f64
        || row_lo >= grid.height as f64
    {
        return None;
    }

    Some((
        col_lo.max(0.0) as usize,
        (col_hi as usize).min(grid.width - 1),
        row_lo.max(0.0) as usize,
        (row_hi as usize).min(grid.height - 1),
    ))
}

fn round(v: f64) -> i64 {
    v.round() as i64
}
