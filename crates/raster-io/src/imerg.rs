//! IMERG HDF5 placement.
//!
//! IMERG stores each variable as `(time, lon, lat)` on a global 0.1° grid and
//! carries no georeferencing GDAL can use: a band's rows run west to east from
//! -180° and its columns south to north from -90°. Bands are transposed into
//! north-up grids here.

use hydro_common::{GeoTransform, Grid};

use crate::error::{RasterError, RasterResult};

pub const CELL: f64 = 0.1;
pub const WEST: f64 = -180.0;
pub const SOUTH: f64 = -90.0;

/// North-up transform for a grid of `nlat` latitude rows.
pub fn transform(nlat: usize) -> GeoTransform {
    GeoTransform::new(WEST, SOUTH + nlat as f64 * CELL, CELL, -CELL)
}

/// Transpose one band stored longitude-major (`raw[lon * nlat + lat]`).
pub fn lon_lat_band(raw: &[f32], nlon: usize, nlat: usize) -> RasterResult<Grid> {
    if raw.len() != nlon * nlat {
        return Err(RasterError::InvalidFormat(format!(
            "IMERG band has {} values, expected {} lon x {} lat",
            raw.len(),
            nlon,
            nlat
        )));
    }

    let mut data = vec![f32::NAN; raw.len()];
    for (lon, column) in raw.chunks_exact(nlat).enumerate() {
        for (lat, &v) in column.iter().enumerate() {
            data[(nlat - 1 - lat) * nlon + lon] = v;
        }
    }
    Ok(Grid::new(nlon, nlat, transform(nlat), data)?)
}
