//! Catchment registry loaded from a GeoJSON FeatureCollection.
//!
//! Feature order is preserved: it defines the canonical column order of every
//! store written for this catchment set.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use hydro_common::BoundingBox;

use crate::error::{ZonalError, ZonalResult};
use crate::geometry::{MultiPolygon, Polygon, Ring};

/// GeoJSON position. Extra ordinates (elevation) are ignored.
pub type Position = Vec<f64>;

/// A GeoJSON FeatureCollection of catchment polygons.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureCollection {
    /// Type identifier (always "FeatureCollection").
    #[serde(rename = "type")]
    pub type_: String,

    pub features: Vec<Feature>,
}

/// A GeoJSON Feature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    /// Type identifier (always "Feature").
    #[serde(rename = "type")]
    pub type_: String,

    /// Optional top-level feature identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    pub geometry: Option<Geometry>,

    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

/// Areal GeoJSON geometries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    /// Array of linear rings (first is exterior, rest are holes).
    Polygon { coordinates: Vec<Vec<Position>> },

    /// Array of polygons.
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
}

/// A catchment: stable id plus footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct Catchment {
    pub id: String,
    pub geometry: MultiPolygon,
}

/// Ordered, id-unique set of catchments.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchmentRegistry {
    catchments: Vec<Catchment>,
}

impl CatchmentRegistry {
    /// Build from catchments, rejecting duplicate ids and empty sets.
    pub fn new(catchments: Vec<Catchment>) -> ZonalResult<Self> {
        if catchments.is_empty() {
            return Err(ZonalError::Empty);
        }
        let mut seen = HashSet::new();
        for c in &catchments {
            if !seen.insert(c.id.as_str()) {
                return Err(ZonalError::DuplicateId(c.id.clone()));
            }
        }
        Ok(Self { catchments })
    }

    /// Load a GeoJSON file, taking ids from `id_property`.
    pub fn load(path: &Path, id_property: &str) -> ZonalResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let registry = Self::from_geojson_str(&text, id_property)?;
        info!(
            path = %path.display(),
            catchments = registry.len(),
            "Loaded catchment registry"
        );
        Ok(registry)
    }

    /// Parse a GeoJSON FeatureCollection.
    pub fn from_geojson_str(text: &str, id_property: &str) -> ZonalResult<Self> {
        let collection: FeatureCollection = serde_json::from_str(text)?;
        let mut catchments = Vec::with_capacity(collection.features.len());

        for (index, feature) in collection.features.into_iter().enumerate() {
            let id = feature
                .properties
                .as_ref()
                .and_then(|p| p.get(id_property))
                .and_then(id_to_string)
                .ok_or_else(|| ZonalError::MissingId {
                    index,
                    property: id_property.to_string(),
                })?;

            let geometry = match feature.geometry {
                Some(g) => to_multipolygon(&id, g)?,
                None => {
                    return Err(ZonalError::InvalidGeometry {
                        id,
                        reason: "null geometry".into(),
                    })
                }
            };
            catchments.push(Catchment { id, geometry });
        }

        Self::new(catchments)
    }

    /// Catchment ids in registry order.
    pub fn ids(&self) -> Vec<String> {
        self.catchments.iter().map(|c| c.id.clone()).collect()
    }

    pub fn catchments(&self) -> &[Catchment] {
        &self.catchments
    }

    pub fn len(&self) -> usize {
        self.catchments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catchments.is_empty()
    }

    /// Extent of every catchment.
    pub fn bbox(&self) -> Option<BoundingBox> {
        self.catchments
            .iter()
            .filter_map(|c| c.geometry.bbox())
            .reduce(|a, b| a.union(&b))
    }
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn to_ring(id: &str, positions: &[Position]) -> ZonalResult<Ring> {
    positions
        .iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] => Ok((*x, *y)),
            _ => Err(ZonalError::InvalidGeometry {
                id: id.to_string(),
                reason: format!("position with {} ordinates", p.len()),
            }),
        })
        .collect()
}

fn to_polygon(id: &str, rings: &[Vec<Position>]) -> ZonalResult<Polygon> {
    let (exterior, holes) = rings.split_first().ok_or_else(|| ZonalError::InvalidGeometry {
        id: id.to_string(),
        reason: "polygon without rings".into(),
    })?;
    let exterior = to_ring(id, exterior)?;
    if exterior.len() < 3 {
        return Err(ZonalError::InvalidGeometry {
            id: id.to_string(),
            reason: "exterior ring has fewer than 3 vertices".into(),
        });
    }
    let holes = holes
        .iter()
        .map(|h| to_ring(id, h))
        .collect::<ZonalResult<Vec<_>>>()?;
    Ok(Polygon::new(exterior, holes))
}

fn to_multipolygon(id: &str, geometry: Geometry) -> ZonalResult<MultiPolygon> {
    let polygons = match geometry {
        Geometry::Polygon { coordinates } => vec![to_polygon(id, &coordinates)?],
        Geometry::MultiPolygon { coordinates } => coordinates
            .iter()
            .map(|rings| to_polygon(id, rings))
            .collect::<ZonalResult<Vec<_>>>()?,
    };
    if polygons.is_empty() {
        return Err(ZonalError::InvalidGeometry {
            id: id.to_string(),
            reason: "empty multipolygon".into(),
        });
    }
    Ok(MultiPolygon::new(polygons))
}
