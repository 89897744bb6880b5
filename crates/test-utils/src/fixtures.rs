//! Catchment fixtures.
//!
//! Catchments are axis-aligned squares in lon/lat degrees, written as a
//! GeoJSON FeatureCollection whose feature order is the registry order.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

/// A square catchment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquareCatchment {
    pub id: &'static str,
    pub min_lon: f64,
    pub min_lat: f64,
    pub size: f64,
}

impl SquareCatchment {
    pub const fn new(id: &'static str, min_lon: f64, min_lat: f64, size: f64) -> Self {
        Self {
            id,
            min_lon,
            min_lat,
            size,
        }
    }

    fn ring(&self) -> Value {
        let (x0, y0) = (self.min_lon, self.min_lat);
        let (x1, y1) = (x0 + self.size, y0 + self.size);
        json!([[[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]])
    }
}

/// Three basins over a 2x2 degree scene at (-72..-70, -34..-32).
///
/// `1001` covers the south-west quarter, `1002` the north-east quarter and
/// `1003` lies outside the scene.
pub const CHILE_BASINS: [SquareCatchment; 3] = [
    SquareCatchment::new("1001", -72.0, -34.0, 1.0),
    SquareCatchment::new("1002", -71.0, -33.0, 1.0),
    SquareCatchment::new("1003", 10.0, 10.0, 1.0),
];

/// GeoJSON for `catchments`, the id stored under `id_property`.
pub fn catchments_geojson(catchments: &[SquareCatchment], id_property: &str) -> String {
    let features: Vec<Value> = catchments
        .iter()
        .map(|c| {
            json!({
                "type": "Feature",
                "properties": { id_property: c.id, "name": format!("basin {}", c.id) },
                "geometry": { "type": "Polygon", "coordinates": c.ring() }
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features }).to_string()
}

/// Write `catchments.geojson` into `dir` and return its path.
pub fn write_catchments(dir: &Path, catchments: &[SquareCatchment], id_property: &str) -> PathBuf {
    let path = dir.join("catchments.geojson");
    fs::write(&path, catchments_geojson(catchments, id_property))
        .expect("failed to write catchments fixture");
    path
}

/// Store header line for `catchments`.
pub fn store_header(catchments: &[SquareCatchment]) -> String {
    let mut cols = vec!["name_id", "date"];
    cols.extend(catchments.iter().map(|c| c.id));
    cols.join(",")
}
