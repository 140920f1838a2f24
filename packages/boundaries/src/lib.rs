#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region partition loading.
//!
//! Reads a `GeoJSON` (or Esri JSON) feature collection, picks the region
//! name property, normalizes names, and reprojects polygons into the
//! working planar CRS so that containment and distance tests operate in
//! meters. Polygons keep their input order, which the spatial join uses to
//! break ties between overlapping regions.

pub mod esri;
pub mod names;
pub mod projection;

use std::path::PathBuf;

use employment_map_geography_models::{BoundarySource, GeometryExtractor, Partition, SourceCrs};
use geo::{MapCoords, MultiPolygon};
use thiserror::Error;

pub use projection::UtmProjection;

/// A named region boundary in the working planar CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Normalized region name.
    pub name: String,
    /// Boundary geometry (meters).
    pub geometry: MultiPolygon<f64>,
}

/// All regions of one partition, in input order.
#[derive(Debug, Clone)]
pub struct RegionSet {
    /// Partition these regions belong to.
    pub partition: Partition,
    /// Property the names were read from.
    pub name_field: String,
    /// Regions in input order.
    pub regions: Vec<Region>,
}

impl RegionSet {
    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` if the set has no regions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Distinct region names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.regions.iter().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Boundary loading failures. All of them abort a run.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// The boundary file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Boundary file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The boundary file is not valid JSON.
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        /// Boundary file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The document has no `features` array.
    #[error("{path} is not a feature collection")]
    NotFeatureCollection {
        /// Boundary file.
        path: PathBuf,
    },

    /// No name property was configured or detected.
    #[error("No region name field in {path} (available: {available:?})")]
    NameFieldNotFound {
        /// Boundary file.
        path: PathBuf,
        /// Properties of the first feature.
        available: Vec<String>,
    },

    /// Every feature was skipped.
    #[error("No usable polygons in {path}")]
    Empty {
        /// Boundary file.
        path: PathBuf,
    },

    /// A UTM zone outside 1–60 was configured.
    #[error("Invalid UTM zone {zone}")]
    InvalidZone {
        /// Configured zone.
        zone: u8,
    },
}

/// Loads the regions of `partition` described by `source`.
///
/// # Errors
///
/// Returns [`BoundaryError`] if the file cannot be read or parsed, has no
/// name field, or yields no polygons.
pub fn load_partition(
    partition: Partition,
    source: &BoundarySource,
    projection: &UtmProjection,
) -> Result<RegionSet, BoundaryError> {
    let text = std::fs::read_to_string(&source.path).map_err(|e| BoundaryError::Io {
        path: source.path.clone(),
        source: e,
    })?;
    let doc: serde_json::Value = serde_json::from_str(&text).map_err(|e| BoundaryError::Json {
        path: source.path.clone(),
        source: e,
    })?;

    let set = parse_regions(partition, &doc, source, projection)?;
    log::info!(
        "Loaded {} {partition} polygons ({} names) from {} using field {:?}",
        set.len(),
        set.names().len(),
        source.path.display(),
        set.name_field
    );
    Ok(set)
}

/// Builds a [`RegionSet`] from an already-parsed feature collection.
///
/// Features without a name or without polygon geometry are skipped with a
/// warning.
///
/// # Errors
///
/// Returns [`BoundaryError`] if `doc` is not a feature collection, has no
/// name field, or yields no polygons.
pub fn parse_regions(
    partition: Partition,
    doc: &serde_json::Value,
    source: &BoundarySource,
    projection: &UtmProjection,
) -> Result<RegionSet, BoundaryError> {
    let path = &source.path;
    let features = doc
        .get("features")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| BoundaryError::NotFeatureCollection { path: path.clone() })?;

    let name_field = match &source.name_field {
        Some(field) => field.clone(),
        None => {
            let keys = first_property_keys(features);
            let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
            names::detect_name_field(&key_refs).ok_or_else(|| {
                BoundaryError::NameFieldNotFound {
                    path: path.clone(),
                    available: keys.clone(),
                }
            })?
        }
    };

    let mut regions = Vec::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        let Some(name) = feature_name(feature, &name_field) else {
            log::warn!("{}: feature {index} has no {name_field:?}, skipping", path.display());
            continue;
        };
        let Some(geometry) = feature_geometry(feature, source.geometry) else {
            log::warn!("{}: feature {index} ({name}) has no polygon geometry, skipping", path.display());
            continue;
        };
        let geometry = match source.crs {
            SourceCrs::Wgs84 => reproject(&geometry, projection),
            SourceCrs::Planar => geometry,
        };
        regions.push(Region { name, geometry });
    }

    if regions.is_empty() {
        return Err(BoundaryError::Empty { path: path.clone() });
    }

    Ok(RegionSet {
        partition,
        name_field,
        regions,
    })
}

fn properties(feature: &serde_json::Value) -> Option<&serde_json::Map<String, serde_json::Value>> {
    feature
        .get("properties")
        .or_else(|| feature.get("attributes"))
        .and_then(serde_json::Value::as_object)
}

fn first_property_keys(features: &[serde_json::Value]) -> Vec<String> {
    features
        .iter()
        .find_map(properties)
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default()
}

fn feature_name(feature: &serde_json::Value, field: &str) -> Option<String> {
    let raw = match properties(feature)?.get(field)? {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(names::normalize_name(&raw)).filter(|name| !name.is_empty())
}

fn feature_geometry(
    feature: &serde_json::Value,
    extractor: GeometryExtractor,
) -> Option<MultiPolygon<f64>> {
    let raw = feature.get("geometry").filter(|g| !g.is_null())?;
    let geojson_value = match extractor {
        GeometryExtractor::Geojson => raw.clone(),
        GeometryExtractor::EsriRings => esri::esri_to_geojson(raw)?,
    };

    let geometry: geojson::Geometry = serde_json::from_value(geojson_value).ok()?;
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Projects a lon/lat multipolygon into the working CRS.
#[must_use]
pub fn reproject(geometry: &MultiPolygon<f64>, projection: &UtmProjection) -> MultiPolygon<f64> {
    geometry.map_coords(|c| {
        let (x, y) = projection.project_lon_lat(c.x, c.y);
        geo::Coord { x, y }
    })
}
