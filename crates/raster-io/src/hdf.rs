//! HDF4-EOS and HDF5 scientific datasets through GDAL (MODIS tiles, IMERG).
//!
//! A layer is located among the container's `SUBDATASETS` by the suffix of its
//! subdataset name (`...:MOD_Grid_MOD15A2H:Lai_500m` for layer `Lai_500m`).
//! Every band of the subdataset is returned as one step. IMERG files carry
//! no usable geotransform and are placed by [`crate::imerg`] instead.

use std::path::Path;

use gdal::raster::Buffer;
use gdal::{Dataset, Metadata};
use tracing::debug;

use hydro_common::{GeoTransform, Grid};

use crate::error::{RasterError, RasterResult};
use crate::imerg;

pub fn probe(path: &Path) -> RasterResult<()> {
    open(path).map(|_| ())
}

pub fn read_layer(path: &Path, layer: Option<&str>) -> RasterResult<Vec<Grid>> {
    let ds = open_layer(path, layer)?;
    let gt = ds
        .geo_transform()
        .map_err(|e| RasterError::MissingData(format!("geotransform: {}", e)))?;
    let transform = GeoTransform::from_gdal(gt);
    let (width, height) = ds.raster_size();

    let steps = read_bands(&ds)?
        .into_iter()
        .map(|data| Grid::new(width, height, transform, data))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        path = %path.display(),
        layer = layer.unwrap_or("<default>"),
        steps = steps.len(),
        "Decoded HDF layer"
    );
    Ok(steps)
}

/// Read an IMERG variable, placing each `(lon, lat)` band on the global grid.
///
/// GDAL exposes the longitude axis as raster rows and latitude as columns.
pub fn read_imerg(path: &Path, layer: Option<&str>) -> RasterResult<Vec<Grid>> {
    let ds = open_layer(path, layer)?;
    let (nlat, nlon) = ds.raster_size();

    let steps = read_bands(&ds)?
        .iter()
        .map(|band| imerg::lon_lat_band(band, nlon, nlat))
        .collect::<RasterResult<Vec<_>>>()?;

    debug!(
        path = %path.display(),
        layer = layer.unwrap_or("<default>"),
        steps = steps.len(),
        nlon,
        nlat,
        "Decoded IMERG layer"
    );
    Ok(steps)
}

fn open_layer(path: &Path, layer: Option<&str>) -> RasterResult<Dataset> {
    let container = open(path)?;
    match layer {
        Some(layer) => {
            let name = find_subdataset(&container, layer)?;
            Dataset::open(Path::new(&name)).map_err(|e| {
                RasterError::InvalidFormat(format!("failed to open subdataset {}: {}", name, e))
            })
        }
        None => Ok(container),
    }
}

/// Every band as row-major values, band nodata masked to `NaN`.
fn read_bands(ds: &Dataset) -> RasterResult<Vec<Vec<f32>>> {
    let (width, height) = ds.raster_size();
    let mut bands = Vec::with_capacity(ds.raster_count());
    for index in 1..=ds.raster_count() {
        let band = ds
            .rasterband(index)
            .map_err(|e| RasterError::InvalidFormat(format!("band {}: {}", index, e)))?;
        let nodata = band.no_data_value();
        let buf: Buffer<f64> = band
            .read_as((0, 0), (width, height), (width, height), None)
            .map_err(|e| RasterError::InvalidFormat(format!("band {}: {}", index, e)))?;

        bands.push(
            buf.data()
                .iter()
                .map(|&v| {
                    if Some(v) == nodata || v.is_nan() {
                        f32::NAN
                    } else {
                        v as f32
                    }
                })
                .collect(),
        );
    }
    Ok(bands)
}

fn open(path: &Path) -> RasterResult<Dataset> {
    Dataset::open(path).map_err(|e| RasterError::InvalidFormat(format!("Failed to open: {}", e)))
}

fn find_subdataset(ds: &Dataset, layer: &str) -> RasterResult<String> {
    let entries = ds.metadata_domain("SUBDATASETS").unwrap_or_default();
    let suffix = format!(":{}", layer);
    entries
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .filter(|(key, _)| key.ends_with("_NAME"))
        .map(|(_, name)| name)
        .find(|name| name.ends_with(&suffix) || name.ends_with(&format!("/{}", layer)))
        .map(str::to_string)
        .ok_or_else(|| RasterError::MissingData(format!("{} subdataset", layer)))
}
