//! Raster decoders for the source products.
//!
//! Every decoder turns one file into a stack of [`Grid`]s, one per time step
//! (most formats yield a single step). Missing pixels are `NaN`.
//!
//! | Format | Backend | Feature |
//! |---|---|---|
//! | GeoTIFF | `tiff` crate | always |
//! | PERSIANN flat binary | native | always |
//! | NetCDF-4 | `netcdf` crate | `netcdf` |
//! | HDF4 / HDF5 | `gdal` crate | `gdal` |
//! | IMERG HDF5 | `gdal` crate, [`imerg`] placement | `gdal` |

use std::path::Path;

use serde::{Deserialize, Serialize};

pub mod error;
pub mod geotiff;
#[cfg(feature = "gdal")]
mod hdf;
pub mod imerg;
#[cfg(feature = "netcdf")]
mod nc;
pub mod persiann;

pub use error::{RasterError, RasterResult};
pub use hydro_common::Grid;

/// On-disk encoding of a product's raw files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterFormat {
    GeoTiff,
    Persiann,
    NetCdf,
    Hdf,
    /// HDF5 laid out `(time, lon, lat)` without georeferencing.
    ImergHdf,
}

impl RasterFormat {
    pub fn name(&self) -> &'static str {
        match self {
            RasterFormat::GeoTiff => "GeoTIFF",
            RasterFormat::Persiann => "PERSIANN binary",
            RasterFormat::NetCdf => "NetCDF",
            RasterFormat::Hdf => "HDF",
            RasterFormat::ImergHdf => "IMERG HDF5",
        }
    }

    /// Whether a decoder for this format is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            RasterFormat::GeoTiff | RasterFormat::Persiann => true,
            RasterFormat::NetCdf => cfg!(feature = "netcdf"),
            RasterFormat::Hdf | RasterFormat::ImergHdf => cfg!(feature = "gdal"),
        }
    }
}

impl std::fmt::Display for RasterFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoder seam used by extraction and file maintenance.
pub trait RasterLoader: Send + Sync {
    /// Decode `layer` (or the file's only layer) into one grid per time step.
    fn load(&self, path: &Path, layer: Option<&str>) -> RasterResult<Vec<Grid>>;

    /// Open the file and check it can be decoded.
    fn probe(&self, path: &Path) -> RasterResult<()>;
}

/// [`RasterLoader`] dispatching on a [`RasterFormat`].
#[derive(Debug, Clone, Copy)]
pub struct FormatLoader {
    format: RasterFormat,
}

impl FormatLoader {
    pub fn new(format: RasterFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> RasterFormat {
        self.format
    }
}

impl RasterLoader for FormatLoader {
    fn load(&self, path: &Path, layer: Option<&str>) -> RasterResult<Vec<Grid>> {
        match self.format {
            RasterFormat::GeoTiff => geotiff::read_geotiff(path).map(|g| vec![g]),
            RasterFormat::Persiann => persiann::read_persiann(path).map(|g| vec![g]),
            RasterFormat::NetCdf => load_netcdf(path, layer),
            RasterFormat::Hdf => load_hdf(path, layer),
            RasterFormat::ImergHdf => load_imerg(path, layer),
        }
    }

    fn probe(&self, path: &Path) -> RasterResult<()> {
        match self.format {
            RasterFormat::GeoTiff => geotiff::read_geotiff(path).map(|_| ()),
            RasterFormat::Persiann => persiann::read_persiann(path).map(|_| ()),
            RasterFormat::NetCdf => probe_netcdf(path),
            RasterFormat::Hdf | RasterFormat::ImergHdf => probe_hdf(path),
        }
    }
}

#[cfg(feature = "netcdf")]
fn load_netcdf(path: &Path, layer: Option<&str>) -> RasterResult<Vec<Grid>> {
    let layer = layer.ok_or_else(|| RasterError::MissingData("NetCDF variable name".into()))?;
    nc::read_variable(path, layer)
}

#[cfg(not(feature = "netcdf"))]
fn load_netcdf(_path: &Path, _layer: Option<&str>) -> RasterResult<Vec<Grid>> {
    Err(netcdf_disabled())
}

#[cfg(feature = "netcdf")]
fn probe_netcdf(path: &Path) -> RasterResult<()> {
    nc::probe(path)
}

#[cfg(not(feature = "netcdf"))]
fn probe_netcdf(_path: &Path) -> RasterResult<()> {
    Err(netcdf_disabled())
}

#[cfg(not(feature = "netcdf"))]
fn netcdf_disabled() -> RasterError {
    RasterError::FeatureDisabled {
        format: RasterFormat::NetCdf.name(),
        feature: "netcdf",
    }
}

#[cfg(feature = "gdal")]
fn load_hdf(path: &Path, layer: Option<&str>) -> RasterResult<Vec<Grid>> {
    hdf::read_layer(path, layer)
}

#[cfg(not(feature = "gdal"))]
fn load_hdf(_path: &Path, _layer: Option<&str>) -> RasterResult<Vec<Grid>> {
    Err(gdal_disabled())
}

#[cfg(feature = "gdal")]
fn load_imerg(path: &Path, layer: Option<&str>) -> RasterResult<Vec<Grid>> {
    hdf::read_imerg(path, layer)
}

#[cfg(not(feature = "gdal"))]
fn load_imerg(_path: &Path, _layer: Option<&str>) -> RasterResult<Vec<Grid>> {
    Err(gdal_disabled())
}

#[cfg(feature = "gdal")]
fn probe_hdf(path: &Path) -> RasterResult<()> {
    hdf::probe(path)
}

#[cfg(not(feature = "gdal"))]
fn probe_hdf(_path: &Path) -> RasterResult<()> {
    Err(gdal_disabled())
}

#[cfg(not(feature = "gdal"))]
fn gdal_disabled() -> RasterError {
    RasterError::FeatureDisabled {
        format: RasterFormat::Hdf.name(),
        feature: "gdal",
    }
}
