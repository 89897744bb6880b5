//! NetCDF reading (GLDAS, ERA5, GFS).
//!
//! A variable is expected to end in `(lat, lon)` dimensions; any leading
//! dimensions (time, valid_time, expver, ...) are flattened into steps.
//! CF packing (`scale_factor`, `add_offset`) and fill values are applied.
//! South-up grids are flipped and 0..360 longitudes rolled to -180..180.

use std::path::Path;

use tracing::debug;

use hydro_common::{GeoTransform, Grid};

use crate::error::{RasterError, RasterResult};

const LAT_NAMES: [&str; 3] = ["lat", "latitude", "y"];
const LON_NAMES: [&str; 3] = ["lon", "longitude", "x"];

/// Open the file and list its variables.
pub fn probe(path: &Path) -> RasterResult<()> {
    let file = open(path)?;
    if file.variables().next().is_none() {
        return Err(RasterError::InvalidFormat("NetCDF file has no variables".into()));
    }
    Ok(())
}

/// Read every step of `name` as north-up grids.
pub fn read_variable(path: &Path, name: &str) -> RasterResult<Vec<Grid>> {
    let file = open(path)?;
    let var = file
        .variable(name)
        .ok_or_else(|| RasterError::MissingData(format!("{} variable", name)))?;

    let dims: Vec<(String, usize)> = var
        .dimensions()
        .iter()
        .map(|d| (d.name(), d.len()))
        .collect();
    if dims.len() < 2 {
        return Err(RasterError::InvalidFormat(format!(
            "{} has {} dimensions, expected at least 2",
            name,
            dims.len()
        )));
    }

    let (lat_dim, lat_len) = &dims[dims.len() - 2];
    let (lon_dim, lon_len) = &dims[dims.len() - 1];
    if !LAT_NAMES.contains(&lat_dim.as_str()) || !LON_NAMES.contains(&lon_dim.as_str()) {
        return Err(RasterError::InvalidFormat(format!(
            "{} is not a (lat, lon) grid: trailing dimensions are ({}, {})",
            name, lat_dim, lon_dim
        )));
    }
    let (height, width) = (*lat_len, *lon_len);

    let lats = read_coordinate(&file, lat_dim)?;
    let lons = read_coordinate(&file, lon_dim)?;
    if lats.len() != height || lons.len() != width || height < 2 || width < 2 {
        return Err(RasterError::InvalidFormat(format!(
            "coordinate lengths ({}, {}) do not match grid {}x{}",
            lats.len(),
            lons.len(),
            width,
            height
        )));
    }

    let dy = lats[1] - lats[0];
    let dx = lons[1] - lons[0];
    let transform = GeoTransform::new(lons[0] - dx / 2.0, lats[0] - dy / 2.0, dx, dy);

    let raw: Vec<f32> = var
        .get_values(..)
        .map_err(|e| RasterError::InvalidFormat(format!("failed to read {}: {}", name, e)))?;

    let scale = get_f32_attr(&var, "scale_factor").unwrap_or(1.0);
    let offset = get_f32_attr(&var, "add_offset").unwrap_or(0.0);
    let fills: Vec<f32> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|a| get_f32_attr(&var, a))
        .collect();

    let cells = width * height;
    let mut steps = Vec::with_capacity(raw.len() / cells.max(1));
    for chunk in raw.chunks_exact(cells) {
        let data = chunk
            .iter()
            .map(|&v| {
                if v.is_nan() || fills.contains(&v) {
                    f32::NAN
                } else {
                    v * scale + offset
                }
            })
            .collect();
        let mut grid = Grid::new(width, height, transform, data)?;
        if dy > 0.0 {
            grid.flip_vertical();
        }
        if let Some((shift, origin)) = longitude_roll(&lons, dx) {
            grid.roll_columns(shift, origin);
        }
        steps.push(grid);
    }

    debug!(
        path = %path.display(),
        variable = name,
        steps = steps.len(),
        width,
        height,
        "Decoded NetCDF variable"
    );
    Ok(steps)
}

fn open(path: &Path) -> RasterResult<netcdf::File> {
    netcdf::open(path)
        .map_err(|e| RasterError::InvalidFormat(format!("Failed to open NetCDF: {}", e)))
}

fn read_coordinate(file: &netcdf::File, name: &str) -> RasterResult<Vec<f64>> {
    file.variable(name)
        .ok_or_else(|| RasterError::MissingData(format!("{} coordinate", name)))?
        .get_values(..)
        .map_err(|e| RasterError::InvalidFormat(format!("failed to read {}: {}", name, e)))
}

/// Columns to rotate when longitudes extend past 180°.
fn longitude_roll(lons: &[f64], dx: f64) -> Option<(usize, f64)> {
    let last = *lons.last()?;
    if last <= 180.0 || dx <= 0.0 {
        return None;
    }
    let shift = lons.iter().position(|&l| l >= 180.0)?;
    Some((shift, lons[shift] - 360.0 - dx / 2.0))
}

fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn get_f32_attr(var: &netcdf::Variable, name: &str) -> Option<f32> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f32::try_from(attr_value).ok()
}
