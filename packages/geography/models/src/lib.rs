#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geographic types shared by the geocoder, the cache, the boundary
//! loader, and the spatial join.
//!
//! Coordinates are always WGS84 degrees; planar points are meters in the
//! working projected CRS. Partitions are the two independent ways the city
//! is divided into regions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate from latitude and longitude.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `true` if both components are finite and within the valid
    /// WGS84 range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A point in the working planar CRS (meters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanarPoint {
    /// Easting.
    pub x: f64,
    /// Northing.
    pub y: f64,
}

/// One of the two independent region classification schemes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Partition {
    /// Neighborhoods (bairros).
    Neighborhood,
    /// Administrative zones.
    Zone,
}

impl Partition {
    /// Both partitions, in output order.
    pub const ALL: [Self; 2] = [Self::Neighborhood, Self::Zone];
}

/// The outcome of assigning one point to a region of one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegionAssignment {
    /// The point lies strictly inside the region.
    Contained {
        /// Region name.
        region: String,
        /// More than one region contained the point; the first in input
        /// order was chosen.
        ambiguous: bool,
    },
    /// The point lies outside every region but within the fallback
    /// tolerance of this region's boundary.
    Nearest {
        /// Region name.
        region: String,
        /// Distance to the boundary in working-CRS meters.
        distance_m: f64,
    },
    /// No containing region and none within tolerance.
    Unassigned {
        /// Distance to the closest boundary that was inspected, if any.
        nearest_distance_m: Option<f64>,
    },
}

impl RegionAssignment {
    /// Returns the assigned region name, if any.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        match self {
            Self::Contained { region, .. } | Self::Nearest { region, .. } => Some(region),
            Self::Unassigned { .. } => None,
        }
    }

    /// Returns `true` if the point matched more than one region.
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Contained { ambiguous: true, .. })
    }
}

/// Coordinate reference system of a boundary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCrs {
    /// WGS84 longitude/latitude (EPSG:4326); reprojected on load.
    #[default]
    Wgs84,
    /// Already in the working planar CRS.
    Planar,
}

/// How polygon geometry is encoded in each feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeometryExtractor {
    /// Standard `GeoJSON` geometry.
    #[default]
    Geojson,
    /// Esri JSON (`{ "rings": [...] }`), converted to `GeoJSON`.
    EsriRings,
}

/// Where a partition's polygons come from and how to read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundarySource {
    /// Path to a `GeoJSON` `FeatureCollection`.
    pub path: PathBuf,
    /// Property holding the region name. Detected automatically when
    /// absent.
    #[serde(default)]
    pub name_field: Option<String>,
    /// CRS of the coordinates in the file.
    #[serde(default)]
    pub crs: SourceCrs,
    /// Geometry encoding.
    #[serde(default)]
    pub geometry: GeometryExtractor,
}
