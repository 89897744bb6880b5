//! Raw scene file generators.
//!
//! Grids are north-up with square cells. Values follow simple patterns so
//! expected catchment aggregates can be computed by hand.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use hydro_common::{GeoTransform, Grid};
use raster_io::geotiff::write_geotiff;
use raster_io::persiann::PersiannLayout;

/// Grid with every pixel set to `value`.
pub fn constant_grid(
    width: usize,
    height: usize,
    origin: (f64, f64),
    cell: f64,
    value: f32,
) -> Grid {
    Grid::filled(
        width,
        height,
        GeoTransform::new(origin.0, origin.1, cell, -cell),
        value,
    )
}

/// Grid whose pixel (col, row) holds `row * width + col`.
///
/// # Example
///
/// ```
/// use test_utils::ramp_grid;
///
/// let g = ramp_grid(3, 2, (0.0, 2.0), 1.0);
/// assert_eq!(g.get(2, 1), Some(5.0));
/// ```
pub fn ramp_grid(width: usize, height: usize, origin: (f64, f64), cell: f64) -> Grid {
    let data = (0..width * height).map(|v| v as f32).collect();
    Grid {
        width,
        height,
        transform: GeoTransform::new(origin.0, origin.1, cell, -cell),
        data,
    }
}

/// MODIS-style tile name, e.g. `MOD13Q1.A2020100.h12v12.061.2020117.hdf`.
pub fn modis_file_name(scene_id: &str, tile: usize) -> String {
    format!(
        "MOD13Q1.{}.h{:02}v{:02}.061.2020117.hdf",
        scene_id,
        10 + tile / 3,
        10 + tile % 3
    )
}

/// Write `tiles` GeoTIFF tiles of one scene under MODIS tile names.
///
/// Tile `i` covers one third by one third of the 2x2 degree box at
/// (-72, -32) (its top-left corner), laid out row-major in a 3x3 block, with
/// every pixel set to `value`. Returns the written paths.
pub fn write_modis_scene(
    dir: &Path,
    scene_id: &str,
    tiles: std::ops::Range<usize>,
    value: f32,
) -> Vec<PathBuf> {
    fs::create_dir_all(dir).expect("failed to create product directory");
    let size = 2.0 / 3.0;
    tiles
        .map(|i| {
            let (col, row) = ((i % 3) as f64, (i / 3) as f64);
            let origin = (-72.0 + col * size, -32.0 - row * size);
            let grid = constant_grid(4, 4, origin, size / 4.0, value);
            let path = dir.join(modis_file_name(scene_id, i));
            write_geotiff(&path, &grid).expect("failed to write GeoTIFF tile");
            path
        })
        .collect()
}

/// Overwrite `path` with bytes no raster decoder accepts.
pub fn corrupt_file(path: &Path) {
    fs::write(path, b"truncated download").expect("failed to corrupt file");
}

/// Little-endian `f32` bytes of a PERSIANN record.
pub fn persiann_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Write a full 0.04° PERSIANN-CCS record, gzipped when `gzip` is set.
///
/// Every pixel holds `background` except the cells listed in `patches` as
/// `(lon, lat, value)` with longitudes in -180..180.
pub fn write_persiann_ccs(path: &Path, background: f32, patches: &[(f64, f64, f32)], gzip: bool) {
    let layout = PersiannLayout::CCS;
    let cells: Vec<(usize, usize, f32)> = patches
        .iter()
        .map(|&(lon, lat, v)| {
            let lon360 = lon.rem_euclid(360.0);
            let col = (lon360 / layout.cell).floor() as usize % layout.width;
            let row = ((layout.north - lat) / layout.cell).floor() as usize;
            (col, row, v)
        })
        .collect();

    let file = File::create(path).expect("failed to create PERSIANN file");
    let mut out: Box<dyn Write> = if gzip {
        Box::new(GzEncoder::new(BufWriter::new(file), Compression::fast()))
    } else {
        Box::new(BufWriter::new(file))
    };

    let mut row_values = vec![background; layout.width];
    for row in 0..layout.height {
        row_values.fill(background);
        for &(c, r, v) in &cells {
            if r == row {
                row_values[c] = v;
            }
        }
        out.write_all(&persiann_bytes(&row_values))
            .expect("failed to write PERSIANN row");
    }
    out.flush().expect("failed to flush PERSIANN file");
}
