//! Product families and their file layout rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use hydro_common::SceneDateFormat;
use raster_io::RasterFormat;

use crate::error::ExtractionError;
use crate::metadata::{NameMatcher, SceneIdRule};

/// Source product family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    /// MODIS tiled HDF4 (nine tiles per scene).
    Modis,
    /// IMERG half-hourly HDF5.
    Imerg,
    /// IMERG half-hourly GeoTIFF.
    ImergGis,
    /// GLDAS 3-hourly NetCDF-4.
    Gldas,
    PersiannCcs,
    PersiannCcsCdr,
    Pdirnow,
    Era5,
    Gfs,
}

impl ProductKind {
    pub const ALL: [ProductKind; 9] = [
        ProductKind::Modis,
        ProductKind::Imerg,
        ProductKind::ImergGis,
        ProductKind::Gldas,
        ProductKind::PersiannCcs,
        ProductKind::PersiannCcsCdr,
        ProductKind::Pdirnow,
        ProductKind::Era5,
        ProductKind::Gfs,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            ProductKind::Modis => "modis",
            ProductKind::Imerg => "imerg",
            ProductKind::ImergGis => "imerg_gis",
            ProductKind::Gldas => "gldas",
            ProductKind::PersiannCcs => "persiann_ccs",
            ProductKind::PersiannCcsCdr => "persiann_ccs_cdr",
            ProductKind::Pdirnow => "pdirnow",
            ProductKind::Era5 => "era5",
            ProductKind::Gfs => "gfs",
        }
    }

    /// Resolve the family's layout rules.
    pub fn spec(&self) -> ProductSpec {
        use ProductKind::*;

        let persiann_id = SceneIdRule::token('.', 0).after("1d");
        let imerg_id = SceneIdRule::token('.', 4).before('-');

        let (expected_files, id_width, listing, scene_id, date_format, format) = match self {
            Modis => (
                9,
                7,
                Listing::top_level(NameMatcher::Suffix(".hdf")),
                SceneIdRule::token('.', 1),
                SceneDateFormat::AYearDoy,
                RasterFormat::Hdf,
            ),
            Imerg => (
                48,
                8,
                Listing::top_level(NameMatcher::Suffix(".HDF5")),
                imerg_id,
                SceneDateFormat::YearMonthDay,
                RasterFormat::ImergHdf,
            ),
            ImergGis => (
                48,
                8,
                Listing::recursive(NameMatcher::Suffix(".tif")),
                imerg_id,
                SceneDateFormat::YearMonthDay,
                RasterFormat::GeoTiff,
            ),
            Gldas => (
                8,
                8,
                Listing::top_level(NameMatcher::Contains {
                    required: &[".nc4"],
                    excluded: &[],
                }),
                SceneIdRule::token('.', 1),
                SceneDateFormat::AYearMonthDay,
                RasterFormat::NetCdf,
            ),
            PersiannCcs => (
                1,
                5,
                Listing::top_level(NameMatcher::Contains {
                    required: &["rgccs", ".bin"],
                    excluded: &[".gz"],
                }),
                persiann_id,
                SceneDateFormat::ShortYearDoy,
                RasterFormat::Persiann,
            ),
            PersiannCcsCdr => (
                1,
                6,
                Listing::top_level(NameMatcher::Contains {
                    required: &["PCCSCDR", ".bin"],
                    excluded: &[".gz"],
                }),
                persiann_id,
                SceneDateFormat::ShortYearMonthDay,
                RasterFormat::Persiann,
            ),
            Pdirnow => (
                1,
                6,
                Listing::top_level(NameMatcher::Contains {
                    required: &["pdirnow", ".bin"],
                    excluded: &[".gz"],
                }),
                persiann_id,
                SceneDateFormat::ShortYearMonthDay,
                RasterFormat::Persiann,
            ),
            Era5 => (
                1,
                8,
                Listing::recursive(NameMatcher::Suffix(".nc")),
                SceneIdRule::token('_', 1).before('.'),
                SceneDateFormat::YearMonthDay,
                RasterFormat::NetCdf,
            ),
            Gfs => (
                1,
                10,
                Listing::recursive(NameMatcher::VariableSegment { suffix: ".nc" }),
                SceneIdRule::last_token('_').before('.'),
                SceneDateFormat::YearMonthDayHour,
                RasterFormat::NetCdf,
            ),
        };

        ProductSpec {
            kind: *self,
            expected_files,
            id_width,
            listing,
            scene_id,
            date_format,
            format,
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ProductKind {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductKind::ALL
            .iter()
            .copied()
            .find(|k| k.tag() == s)
            .ok_or_else(|| ExtractionError::Config(format!("Unknown product '{}'", s)))
    }
}

/// Where the raw files of a product live relative to its directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Listing {
    pub recursive: bool,
    pub matcher: NameMatcher,
}

impl Listing {
    pub const fn top_level(matcher: NameMatcher) -> Self {
        Self {
            recursive: false,
            matcher,
        }
    }

    pub const fn recursive(matcher: NameMatcher) -> Self {
        Self {
            recursive: true,
            matcher,
        }
    }
}

/// Everything the pipeline needs to know about a product family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductSpec {
    pub kind: ProductKind,
    /// Raw files making up one complete scene.
    pub expected_files: usize,
    /// Zero-padded width of all-digit scene ids.
    pub id_width: usize,
    pub listing: Listing,
    pub scene_id: SceneIdRule,
    pub date_format: SceneDateFormat,
    pub format: RasterFormat,
}

impl ProductSpec {
    /// Scene id of a bare file name, if it follows the product's rule and
    /// encodes a valid date.
    pub fn scene_id(&self, file_name: &str) -> Option<String> {
        let id = self.scene_id.scene_id(file_name)?;
        self.date_format.parse(&id).ok().map(|_| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip() {
        for kind in ProductKind::ALL {
            assert_eq!(kind.tag().parse::<ProductKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_tag_is_config_error() {
        let err = "landsat".parse::<ProductKind>().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_expected_counts() {
        assert_eq!(ProductKind::Modis.spec().expected_files, 9);
        assert_eq!(ProductKind::Imerg.spec().expected_files, 48);
        assert_eq!(ProductKind::ImergGis.spec().expected_files, 48);
        assert_eq!(ProductKind::Gldas.spec().expected_files, 8);
        assert_eq!(ProductKind::Era5.spec().expected_files, 1);
        assert_eq!(ProductKind::PersiannCcs.spec().expected_files, 1);
    }

    #[test]
    fn test_scene_ids_per_family() {
        let cases = [
            (ProductKind::Modis, "MOD13Q1.A2020100.h12v12.061.2020117.hdf", "A2020100"),
            (
                ProductKind::ImergGis,
                "3B-HHR-GIS.MS.MRG.3IMERG.20200101-S000000-E002959.0000.V06B.tif",
                "20200101",
            ),
            (ProductKind::Gldas, "GLDAS_NOAH025_3H.A20200101.0000.021.nc4", "A20200101"),
            (ProductKind::PersiannCcs, "rgccs1d20032.bin", "20032"),
            (ProductKind::PersiannCcsCdr, "PCCSCDR_1d200101.bin", "200101"),
            (ProductKind::Era5, "era5_20200101.nc", "20200101"),
            (ProductKind::Gfs, "gfs_tp_2020010106.nc", "2020010106"),
        ];
        for (kind, name, id) in cases {
            assert_eq!(kind.spec().scene_id(name).as_deref(), Some(id), "{}", kind);
        }
    }

    #[test]
    fn test_scene_id_must_encode_a_date() {
        let spec = ProductKind::Modis.spec();
        assert_eq!(spec.scene_id("MOD13Q1.B2020100.h12v12.hdf"), None);
        assert_eq!(spec.scene_id("MOD13Q1.A2020400.h12v12.hdf"), None);
    }
}
