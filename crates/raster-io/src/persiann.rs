//! PERSIANN family flat binary rasters (CCS, CCS-CDR, PDIR-Now).
//!
//! Files are headerless little-endian `f32` arrays, north row first, with
//! longitudes running 0..360. Negative values flag missing data. Archives are
//! frequently distributed gzipped; compressed input is detected by its magic
//! bytes.

use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::debug;

use hydro_common::{GeoTransform, Grid};

use crate::error::{RasterError, RasterResult};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Shape and placement of a PERSIANN binary grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersiannLayout {
    pub width: usize,
    pub height: usize,
    /// Cell size in degrees.
    pub cell: f64,
    /// Northern edge of the first row.
    pub north: f64,
}

impl PersiannLayout {
    /// Global 0.04° quasi-global grid, 60°N to 60°S.
    pub const CCS: PersiannLayout = PersiannLayout {
        width: 9000,
        height: 3000,
        cell: 0.04,
        north: 60.0,
    };

    fn byte_len(&self) -> usize {
        self.width * self.height * 4
    }
}

/// Read a PERSIANN file with the standard 0.04° layout.
pub fn read_persiann(path: &Path) -> RasterResult<Grid> {
    let raw = fs::read(path)?;
    let grid = decode(&raw, PersiannLayout::CCS)?;
    debug!(path = %path.display(), valid = grid.valid_count(), "Decoded PERSIANN binary");
    Ok(grid)
}

/// Decode raw (optionally gzipped) bytes into a -180..180 grid.
pub fn decode(raw: &[u8], layout: PersiannLayout) -> RasterResult<Grid> {
    let inflated;
    let bytes = if raw.starts_with(&GZIP_MAGIC) {
        let mut buf = Vec::with_capacity(layout.byte_len());
        GzDecoder::new(raw).read_to_end(&mut buf)?;
        inflated = buf;
        &inflated[..]
    } else {
        raw
    };

    if bytes.len() < layout.byte_len() {
        return Err(RasterError::InvalidFormat(format!(
            "PERSIANN record too short: {} bytes, expected {}",
            bytes.len(),
            layout.byte_len()
        )));
    }

    let data: Vec<f32> = bytes[..layout.byte_len()]
        .chunks_exact(4)
        .map(|b| {
            let v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            if v < 0.0 {
                f32::NAN
            } else {
                v
            }
        })
        .collect();

    let transform = GeoTransform::new(0.0, layout.north, layout.cell, -layout.cell);
    let mut grid = Grid::new(layout.width, layout.height, transform, data)?;
    grid.roll_columns(layout.width / 2, -180.0);
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const SMALL: PersiannLayout = PersiannLayout {
        width: 4,
        height: 2,
        cell: 90.0,
        north: 60.0,
    };

    fn encode(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_rolls_to_greenwich_centred() {
        let raw = encode(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let grid = decode(&raw, SMALL).unwrap();
        assert_eq!(grid.data, vec![3.0, 4.0, 1.0, 2.0, 7.0, 8.0, 5.0, 6.0]);
        assert_eq!(grid.transform.origin_x, -180.0);
        assert_eq!(grid.transform.origin_y, 60.0);
        assert_eq!(grid.transform.pixel_height, -90.0);
    }

    #[test]
    fn test_negative_values_are_missing() {
        let raw = encode(&[-9999.0, 0.0, 1.5, -1.0, 0.0, 0.0, 0.0, 0.0]);
        let grid = decode(&raw, SMALL).unwrap();
        assert_eq!(grid.valid_count(), 6);
        // Column 0 moved to column 2 after the roll
        assert!(grid.data[2].is_nan());
        assert_eq!(grid.data[0], 1.5);
    }

    #[test]
    fn test_gzipped_input() {
        let raw = encode(&[1.0; 8]);
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&raw).unwrap();
        let gz = enc.finish().unwrap();

        let grid = decode(&gz, SMALL).unwrap();
        assert_eq!(grid.valid_count(), 8);
    }

    #[test]
    fn test_short_record_is_invalid() {
        let raw = encode(&[1.0; 5]);
        assert!(matches!(
            decode(&raw, SMALL),
            Err(RasterError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_read_missing_file() {
        assert!(matches!(
            read_persiann(Path::new("/nonexistent/rgccs1d20032.bin")),
            Err(RasterError::Io(_))
        ));
    }
}
