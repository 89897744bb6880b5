//! Georeferenced raster grids.
//!
//! A [`Grid`] is a row-major `f32` raster on a regular lat/lon lattice. Missing
//! pixels are stored as `NaN`; every producer (decoders, mosaics, temporal
//! reducers) and consumer (zonal statistics) relies on that convention.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{CommonError, CommonResult};

/// Affine placement of a north-up grid.
///
/// `origin_x`/`origin_y` is the outer corner of pixel (0, 0). For north-up
/// rasters `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Build from a GDAL-style six element transform. Rotation terms are ignored.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self::new(gt[0], gt[3], gt[1], gt[5])
    }

    /// Coordinates of the centre of pixel (col, row).
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional pixel coordinates of a geographic point.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// True when both transforms share pixel size within a small tolerance.
    pub fn same_resolution(&self, other: &GeoTransform) -> bool {
        let tol = self.pixel_width.abs() * 1e-6;
        (self.pixel_width - other.pixel_width).abs() <= tol
            && (self.pixel_height - other.pixel_height).abs() <= tol
    }

    fn approx_eq(&self, other: &GeoTransform) -> bool {
        let tol = self.pixel_width.abs() * 1e-6;
        self.same_resolution(other)
            && (self.origin_x - other.origin_x).abs() <= tol
            && (self.origin_y - other.origin_y).abs() <= tol
    }
}

/// A georeferenced `f32` raster with `NaN` as the missing marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub data: Vec<f32>,
}

impl Grid {
    /// Create a grid, validating the data length.
    pub fn new(
        width: usize,
        height: usize,
        transform: GeoTransform,
        data: Vec<f32>,
    ) -> CommonResult<Self> {
        if data.len() != width * height {
            return Err(CommonError::DataLength {
                width,
                height,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            transform,
            data,
        })
    }

    /// Create a grid where every pixel holds `value`.
    pub fn filled(width: usize, height: usize, transform: GeoTransform, value: f32) -> Self {
        Self {
            width,
            height,
            transform,
            data: vec![value; width * height],
        }
    }

    /// Total number of pixels.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Valid value at (col, row); `None` when missing or out of range.
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let v = self.data[row * self.width + col];
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    /// Pixel containing the geographic point, if inside the grid.
    pub fn pixel_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (px, py) = self.transform.geo_to_pixel(x, y);
        if px < 0.0 || py < 0.0 {
            return None;
        }
        let (col, row) = (px.floor() as usize, py.floor() as usize);
        if col >= self.width || row >= self.height {
            return None;
        }
        Some((col, row))
    }

    /// Outer extent of the grid.
    pub fn bbox(&self) -> BoundingBox {
        let t = &self.transform;
        let x1 = t.origin_x + self.width as f64 * t.pixel_width;
        let y1 = t.origin_y + self.height as f64 * t.pixel_height;
        BoundingBox::new(
            t.origin_x.min(x1),
            t.origin_y.min(y1),
            t.origin_x.max(x1),
            t.origin_y.max(y1),
        )
    }

    /// Number of non-missing pixels.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// True when `other` has identical shape and placement.
    pub fn is_aligned_with(&self, other: &Grid) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.transform.approx_eq(&other.transform)
    }

    /// Apply `f` to every valid pixel; missing pixels stay missing.
    pub fn map<F>(&self, f: F) -> Grid
    where
        F: Fn(f32) -> f32,
    {
        let data = self
            .data
            .iter()
            .map(|&v| if v.is_nan() { v } else { f(v) })
            .collect();
        Grid {
            data,
            ..self.clone()
        }
    }

    /// Combine two aligned grids pixel by pixel. `f` sees raw values, NaN included.
    pub fn zip_with<F>(&self, other: &Grid, f: F) -> CommonResult<Grid>
    where
        F: Fn(f32, f32) -> f32,
    {
        if !self.is_aligned_with(other) {
            return Err(CommonError::ShapeMismatch {
                left: self.describe(),
                right: other.describe(),
            });
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Grid {
            data,
            ..self.clone()
        })
    }

    /// Turn every pixel equal to `nodata` into a missing value.
    pub fn mask_value(&mut self, nodata: f32) {
        for v in &mut self.data {
            if *v == nodata {
                *v = f32::NAN;
            }
        }
    }

    /// Subset to the pixels whose centres fall inside `bbox`.
    ///
    /// Returns `None` when no pixel centre falls inside.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<Grid> {
        let cols: Vec<usize> = (0..self.width)
            .filter(|&c| {
                let (x, _) = self.transform.cell_center(c, 0);
                x >= bbox.min_x && x <= bbox.max_x
            })
            .collect();
        let rows: Vec<usize> = (0..self.height)
            .filter(|&r| {
                let (_, y) = self.transform.cell_center(0, r);
                y >= bbox.min_y && y <= bbox.max_y
            })
            .collect();

        let (c0, c1) = (*cols.first()?, *cols.last()?);
        let (r0, r1) = (*rows.first()?, *rows.last()?);
        let width = c1 - c0 + 1;
        let height = r1 - r0 + 1;

        let mut data = Vec::with_capacity(width * height);
        for row in r0..=r1 {
            let start = row * self.width + c0;
            data.extend_from_slice(&self.data[start..start + width]);
        }

        let t = &self.transform;
        Some(Grid {
            width,
            height,
            transform: GeoTransform::new(
                t.origin_x + c0 as f64 * t.pixel_width,
                t.origin_y + r0 as f64 * t.pixel_height,
                t.pixel_width,
                t.pixel_height,
            ),
            data,
        })
    }

    /// Reverse row order, turning a south-up grid into a north-up one.
    pub fn flip_vertical(&mut self) {
        let w = self.width;
        for row in 0..self.height / 2 {
            let other = self.height - 1 - row;
            for col in 0..w {
                self.data.swap(row * w + col, other * w + col);
            }
        }
        let t = &mut self.transform;
        t.origin_y += self.height as f64 * t.pixel_height;
        t.pixel_height = -t.pixel_height;
    }

    /// Rotate every row left by `shift` columns and move the origin accordingly.
    ///
    /// Used to turn 0..360 longitude grids into -180..180 ones.
    pub fn roll_columns(&mut self, shift: usize, new_origin_x: f64) {
        if self.width == 0 {
            return;
        }
        let shift = shift % self.width;
        for row in self.data.chunks_mut(self.width) {
            row.rotate_left(shift);
        }
        self.transform.origin_x = new_origin_x;
    }

    fn describe(&self) -> String {
        format!(
            "{}x{} at ({}, {}) step ({}, {})",
            self.width,
            self.height,
            self.transform.origin_x,
            self.transform.origin_y,
            self.transform.pixel_width,
            self.transform.pixel_height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Grid {
        // 3x2 grid covering x 0..3, y 0..2, north-up
        Grid::new(
            3,
            2,
            GeoTransform::new(0.0, 2.0, 1.0, -1.0),
            vec![1.0, 2.0, f32::NAN, 4.0, 5.0, 6.0],
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_length() {
        let err = Grid::new(2, 2, GeoTransform::new(0.0, 0.0, 1.0, -1.0), vec![1.0]);
        assert!(err.is_err());
    }

    #[test]
    fn test_get_and_pixel_at() {
        let g = sample();
        assert_eq!(g.get(0, 0), Some(1.0));
        assert_eq!(g.get(2, 0), None);
        assert_eq!(g.get(5, 5), None);
        assert_eq!(g.pixel_at(0.5, 1.5), Some((0, 0)));
        assert_eq!(g.pixel_at(2.5, 0.5), Some((2, 1)));
        assert_eq!(g.pixel_at(-0.5, 0.5), None);
    }

    #[test]
    fn test_bbox_and_center() {
        let g = sample();
        assert_eq!(g.bbox(), BoundingBox::new(0.0, 0.0, 3.0, 2.0));
        assert_eq!(g.transform.cell_center(1, 1), (1.5, 0.5));
    }

    #[test]
    fn test_map_keeps_missing() {
        let g = sample().map(|v| v * 10.0);
        assert_eq!(g.data[0], 10.0);
        assert!(g.data[2].is_nan());
        assert_eq!(g.valid_count(), 5);
    }

    #[test]
    fn test_zip_with_requires_alignment() {
        let a = sample();
        let mut b = sample();
        assert!(a.zip_with(&b, |x, y| x + y).is_ok());
        b.transform.origin_x = 10.0;
        assert!(a.zip_with(&b, |x, y| x + y).is_err());
    }

    #[test]
    fn test_crop() {
        let g = sample();
        let c = g.crop(&BoundingBox::new(0.9, 0.0, 3.0, 1.0)).unwrap();
        assert_eq!((c.width, c.height), (2, 1));
        assert_eq!(c.data, vec![5.0, 6.0]);
        assert_eq!(c.transform.origin_x, 1.0);
        assert_eq!(c.transform.origin_y, 1.0);
        assert!(g.crop(&BoundingBox::new(50.0, 50.0, 60.0, 60.0)).is_none());
    }

    #[test]
    fn test_flip_vertical() {
        let mut g = Grid::new(
            2,
            2,
            GeoTransform::new(0.0, 0.0, 1.0, 1.0),
            vec![1.0, 2.0, 3.0, 4.0],
        )
        .unwrap();
        g.flip_vertical();
        assert_eq!(g.data, vec![3.0, 4.0, 1.0, 2.0]);
        assert_eq!(g.transform.origin_y, 2.0);
        assert_eq!(g.transform.pixel_height, -1.0);
        // Top-left pixel centre is now the northern row
        assert_eq!(g.transform.cell_center(0, 0), (0.5, 1.5));
    }

    #[test]
    fn test_roll_columns() {
        let mut g = Grid::new(
            4,
            1,
            GeoTransform::new(0.0, 1.0, 90.0, -1.0),
            vec![1.0, 2.0, 3.0, 4.0],
        )
        .unwrap();
        g.roll_columns(2, -180.0);
        assert_eq!(g.data, vec![3.0, 4.0, 1.0, 2.0]);
        assert_eq!(g.transform.origin_x, -180.0);
    }

    #[test]
    fn test_mask_value() {
        let mut g = sample();
        g.mask_value(5.0);
        assert!(g.data[4].is_nan());
        assert_eq!(g.valid_count(), 4);
    }
}
