//! Approximate area centroids keyed by postal code prefix.
//!
//! Teresina's CEP range (`64000-000` to `64099-999`) is allocated by area,
//! so the first four digits place a code roughly in the city. This is far
//! coarser than a street-level geocode and is disabled by default; results
//! carry the `fallback_by_prefix` source tag so reports can tell them apart.

use async_trait::async_trait;
use employment_map_employment_models::PostalCode;
use employment_map_geography_models::Coordinate;

use crate::{GeocodeError, GeocodedPostalCode, PostalGeocoder};

/// Source tag recorded for coordinates produced by this provider.
pub const SOURCE_TAG: &str = "fallback_by_prefix";

/// Number of leading digits used as the lookup key.
pub const PREFIX_LEN: usize = 4;

/// `(prefix, latitude, longitude, area)` for Teresina.
const TERESINA_PREFIXES: &[(&str, f64, f64, &str)] = &[
    ("6400", -5.0892, -42.8019, "Centro"),
    ("6401", -5.0979, -42.7971, "Centro"),
    ("6402", -5.1214, -42.7922, "Zona Sul"),
    ("6403", -5.1345, -42.7845, "Zona Sul"),
    ("6404", -5.0781, -42.7842, "Zona Leste"),
    ("6405", -5.0647, -42.7648, "Zona Leste"),
    ("6406", -5.0464, -42.7514, "Zona Norte"),
    ("6407", -5.1177, -42.7548, "Zona Norte"),
    ("6408", -5.1795, -42.7580, "Areas Perifericas"),
    ("6409", -5.1890, -42.7399, "Areas Perifericas"),
];

/// Prefix-to-centroid lookup provider.
pub struct PrefixCentroid {
    id: String,
    table: Vec<(String, Coordinate, String)>,
}

impl PrefixCentroid {
    /// Creates the provider with the built-in Teresina table.
    #[must_use]
    pub fn teresina(id: &str) -> Self {
        Self {
            id: id.to_string(),
            table: TERESINA_PREFIXES
                .iter()
                .map(|(prefix, lat, lon, area)| {
                    ((*prefix).to_string(), Coordinate::new(*lat, *lon), (*area).to_string())
                })
                .collect(),
        }
    }

    /// Looks up the centroid and area name for `code`'s prefix.
    #[must_use]
    pub fn lookup(&self, code: &PostalCode) -> Option<(Coordinate, &str)> {
        let prefix = code.prefix(PREFIX_LEN);
        self.table
            .iter()
            .find(|(p, _, _)| p == prefix)
            .map(|(_, coordinate, area)| (*coordinate, area.as_str()))
    }
}

#[async_trait]
impl PostalGeocoder for PrefixCentroid {
    fn id(&self) -> &str {
        &self.id
    }

    async fn geocode(&self, code: &PostalCode) -> Result<Option<GeocodedPostalCode>, GeocodeError> {
        Ok(self.lookup(code).map(|(coordinate, area)| GeocodedPostalCode {
            coordinate,
            source: SOURCE_TAG.to_string(),
            matched_address: Some(area.to_string()),
        }))
    }
}
