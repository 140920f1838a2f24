//! WGS84 → SIRGAS 2000 / UTM forward projection.
//!
//! SIRGAS 2000 uses the GRS80 ellipsoid and is coincident with WGS84 at
//! the precision geocoded postal codes carry, so no datum shift is
//! applied. The series expansion is the USGS transverse Mercator forward
//! formula (Snyder, *Map Projections: A Working Manual*, eq. 8-9 to 8-10),
//! accurate to well under a meter within a zone.

use employment_map_geography_models::{Coordinate, PlanarPoint};

use crate::BoundaryError;

/// GRS80 semi-major axis in meters.
const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
/// GRS80 flattening.
const FLATTENING: f64 = 1.0 / 298.257_222_101;
/// UTM scale factor on the central meridian.
const SCALE_FACTOR: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Teresina's UTM zone.
pub const DEFAULT_ZONE: u8 = 23;

/// A UTM zone on the GRS80 ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtmProjection {
    zone: u8,
    south: bool,
    central_meridian: f64,
}

impl Default for UtmProjection {
    /// SIRGAS 2000 / UTM zone 23S (EPSG:31983).
    fn default() -> Self {
        Self {
            zone: DEFAULT_ZONE,
            south: true,
            central_meridian: central_meridian(DEFAULT_ZONE),
        }
    }
}

fn central_meridian(zone: u8) -> f64 {
    f64::from(zone).mul_add(6.0, -183.0).to_radians()
}

impl UtmProjection {
    /// Creates a projection for `zone` (1–60) in the given hemisphere.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError::InvalidZone`] for zones outside 1–60.
    pub fn new(zone: u8, south: bool) -> Result<Self, BoundaryError> {
        if !(1..=60).contains(&zone) {
            return Err(BoundaryError::InvalidZone { zone });
        }
        Ok(Self {
            zone,
            south,
            central_meridian: central_meridian(zone),
        })
    }

    /// UTM zone number.
    #[must_use]
    pub const fn zone(&self) -> u8 {
        self.zone
    }

    /// Whether the southern false northing is applied.
    #[must_use]
    pub const fn is_south(&self) -> bool {
        self.south
    }

    /// Projects a WGS84 coordinate.
    #[must_use]
    pub fn project(&self, coordinate: Coordinate) -> PlanarPoint {
        let (x, y) = self.project_lon_lat(coordinate.longitude, coordinate.latitude);
        PlanarPoint { x, y }
    }

    /// Projects longitude/latitude in degrees to easting/northing in
    /// meters.
    #[must_use]
    pub fn project_lon_lat(&self, longitude: f64, latitude: f64) -> (f64, f64) {
        let e2 = FLATTENING * (2.0 - FLATTENING);
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        let ep2 = e2 / (1.0 - e2);

        let phi = latitude.to_radians();
        let (sin_phi, cos_phi) = phi.sin_cos();
        let tan_phi = phi.tan();

        let n = SEMI_MAJOR_AXIS / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        let t = tan_phi * tan_phi;
        let c = ep2 * cos_phi * cos_phi;
        let a = cos_phi * (longitude.to_radians() - self.central_meridian);

        // Meridian arc length from the equator.
        let m = SEMI_MAJOR_AXIS
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin());

        let a2 = a * a;
        let a3 = a2 * a;
        let a4 = a3 * a;
        let a5 = a4 * a;
        let a6 = a5 * a;

        let x = SCALE_FACTOR
            * n
            * (a + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0)
            + FALSE_EASTING;

        let mut y = SCALE_FACTOR
            * (m + n
                * tan_phi
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));

        if self.south {
            y += FALSE_NORTHING_SOUTH;
        }

        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn equator_on_central_meridian_is_false_origin() {
        let projection = UtmProjection::default();
        let p = projection.project(Coordinate::new(0.0, -45.0));
        assert_close(p.x, 500_000.0, 1e-6);
        assert_close(p.y, 10_000_000.0, 1e-6);
    }

    #[test]
    fn projects_teresina_center() {
        let p = UtmProjection::default().project(Coordinate::new(-5.0892, -42.8019));
        assert_close(p.x, 743_694.9, 0.5);
        assert_close(p.y, 9_437_060.8, 0.5);
    }

    #[test]
    fn small_offsets_are_metric() {
        let projection = UtmProjection::default();
        let a = projection.project(Coordinate::new(-5.0892, -42.8019));
        let b = projection.project(Coordinate::new(-5.0902, -42.8019));
        let d = (a.x - b.x).hypot(a.y - b.y);
        // One thousandth of a degree of latitude is ~110.6 m here.
        assert_close(d, 110.6, 0.5);
    }

    #[test]
    fn northern_hemisphere_has_no_false_northing() {
        let projection = UtmProjection::new(23, false).unwrap();
        let p = projection.project(Coordinate::new(1.0, -45.0));
        assert!(p.y > 0.0 && p.y < 200_000.0);
    }

    #[test]
    fn rejects_invalid_zone() {
        assert!(matches!(
            UtmProjection::new(0, true),
            Err(BoundaryError::InvalidZone { zone: 0 })
        ));
        assert!(UtmProjection::new(61, true).is_err());
    }
}
