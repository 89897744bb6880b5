//! Single-band GeoTIFF reading and writing.
//!
//! Georeferencing comes from the `ModelPixelScale` and `ModelTiepoint` tags
//! (raster-to-model placement, PixelIsArea). Rotated rasters
//! (`ModelTransformation`) are not supported. Pixels equal to the GDAL nodata
//! tag (42113, e.g. IMERG-GIS `29999`) are read as missing; a product nodata
//! value set by the caller is applied on top.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::{debug, warn};

use hydro_common::{GeoTransform, Grid};

use crate::error::{RasterError, RasterResult};

/// Decode the first image of a GeoTIFF into a grid.
pub fn read_geotiff(path: &Path) -> RasterResult<Grid> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?;

    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let scale = decoder
        .find_tag(Tag::ModelPixelScaleTag)?
        .ok_or_else(|| RasterError::MissingData("ModelPixelScale tag".into()))?
        .into_f64_vec()?;
    let tiepoint = decoder
        .find_tag(Tag::ModelTiepointTag)?
        .ok_or_else(|| RasterError::MissingData("ModelTiepoint tag".into()))?
        .into_f64_vec()?;

    let transform = transform_from_tags(&scale, &tiepoint)?;
    let nodata = match decoder.find_tag(Tag::GdalNodata)? {
        Some(value) => parse_nodata(&value.into_string()?).or_else(|| {
            warn!(path = %path.display(), "Ignoring unparseable GDAL nodata tag");
            None
        }),
        None => None,
    };
    let data = samples_to_f32(decoder.read_image()?);

    if data.len() != width * height {
        return Err(RasterError::InvalidFormat(format!(
            "expected a single band of {}x{} samples, got {}",
            width,
            height,
            data.len()
        )));
    }

    let mut grid = Grid::new(width, height, transform, data)?;
    if let Some(nodata) = nodata {
        grid.mask_value(nodata);
    }
    debug!(path = %path.display(), width, height, nodata = ?nodata, "Decoded GeoTIFF");
    Ok(grid)
}

/// Write a grid as a single-band `f32` GeoTIFF.
pub fn write_geotiff(path: &Path, grid: &Grid) -> RasterResult<()> {
    write_geotiff_with_nodata(path, grid, None)
}

/// Write a grid, recording `nodata` in the GDAL nodata tag when set.
pub fn write_geotiff_with_nodata(path: &Path, grid: &Grid, nodata: Option<f32>) -> RasterResult<()> {
    let file = File::create(path)?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    let mut image =
        encoder.new_image::<colortype::Gray32Float>(grid.width as u32, grid.height as u32)?;

    let t = grid.transform;
    let scale = [t.pixel_width, -t.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
    if let Some(nodata) = nodata {
        image
            .encoder()
            .write_tag(Tag::GdalNodata, nodata.to_string().as_str())?;
    }
    image.write_data(&grid.data)?;
    Ok(())
}

fn transform_from_tags(scale: &[f64], tiepoint: &[f64]) -> RasterResult<GeoTransform> {
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(RasterError::InvalidFormat(format!(
            "short georeferencing tags (scale {}, tiepoint {})",
            scale.len(),
            tiepoint.len()
        )));
    }
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    let (sx, sy) = (scale[0], scale[1]);
    if sx == 0.0 || sy == 0.0 {
        return Err(RasterError::InvalidFormat("zero pixel scale".into()));
    }
    Ok(GeoTransform::new(x - i * sx, y + j * sy, sx, -sy))
}

/// GDAL stores nodata as ASCII text, NUL-terminated and sometimes padded.
fn parse_nodata(text: &str) -> Option<f32> {
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .parse()
        .ok()
}

fn samples_to_f32(image: DecodingResult) -> Vec<f32> {
    match image {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiepoint_with_offset() {
        let t = transform_from_tags(&[0.5, 0.25, 0.0], &[2.0, 4.0, 0.0, -70.0, -30.0, 0.0]).unwrap();
        assert_eq!(t.origin_x, -71.0);
        assert_eq!(t.origin_y, -29.0);
        assert_eq!(t.pixel_width, 0.5);
        assert_eq!(t.pixel_height, -0.25);
    }

    #[test]
    fn test_rejects_short_tags() {
        assert!(transform_from_tags(&[0.5], &[0.0; 6]).is_err());
        assert!(transform_from_tags(&[0.5, 0.5, 0.0], &[0.0; 3]).is_err());
    }

    #[test]
    fn test_write_then_read_preserves_placement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.tif");
        let grid = Grid::new(
            3,
            2,
            GeoTransform::new(-72.0, -30.0, 0.5, -0.5),
            vec![1.0, 2.0, 3.0, f32::NAN, 5.0, -6.5],
        )
        .unwrap();

        write_geotiff(&path, &grid).unwrap();
        let back = read_geotiff(&path).unwrap();

        assert_eq!((back.width, back.height), (3, 2));
        assert_eq!(back.transform, grid.transform);
        assert_eq!(back.data[5], -6.5);
        assert!(back.data[3].is_nan());
    }

    #[test]
    fn test_gdal_nodata_tag_masks_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("3B-HHR-GIS.tif");
        let grid = Grid::new(
            2,
            2,
            GeoTransform::new(-72.0, -30.0, 0.1, -0.1),
            vec![29999.0, 4.0, 0.0, 29999.0],
        )
        .unwrap();

        write_geotiff_with_nodata(&path, &grid, Some(29999.0)).unwrap();
        let back = read_geotiff(&path).unwrap();

        assert!(back.data[0].is_nan());
        assert_eq!(back.data[1..3], [4.0, 0.0]);
        assert!(back.data[3].is_nan());
        assert_eq!(back.valid_count(), 2);
    }

    #[test]
    fn test_parse_nodata_text() {
        assert_eq!(parse_nodata("29999\0"), Some(29999.0));
        assert_eq!(parse_nodata(" -3000 "), Some(-3000.0));
        assert!(parse_nodata("nan").unwrap().is_nan());
        assert_eq!(parse_nodata("none"), None);
    }

    #[test]
    fn test_truncated_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.tif");
        std::fs::write(&path, b"II*\0garbage").unwrap();
        assert!(read_geotiff(&path).is_err());
    }
}
