#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial join of planar points to the regions of a partition.
//!
//! A [`ContainmentIndex`] is built once from a [`RegionSet`] and queried
//! many times. [`SpatialJoiner`] layers the assignment policy on top:
//!
//! 1. If one or more regions contain the point, the first in input order
//!    wins; more than one is logged as ambiguous.
//! 2. Otherwise the region with the nearest boundary wins, provided the
//!    distance is within the configured tolerance.
//! 3. Otherwise the point is unassigned.

use employment_map_boundaries::RegionSet;
use employment_map_geography_models::{Partition, PlanarPoint, RegionAssignment};
use geo::{BoundingRect, Contains, Distance, Euclidean, LineString, MultiPolygon, Point};
use rstar::{AABB, Envelope, RTree, RTreeObject};

/// Build-once, query-many point lookups over one partition's polygons.
///
/// Region indices are positions in the [`RegionSet`] the index was built
/// from.
pub trait ContainmentIndex: Send + Sync {
    /// Number of indexed regions.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is indexed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the region at `index`.
    fn region_name(&self, index: usize) -> &str;

    /// Indices of every region strictly containing `point`, ascending.
    fn containing(&self, point: PlanarPoint) -> Vec<usize>;

    /// The region whose boundary is closest to `point`, searching only
    /// regions whose bounding box lies within `search_radius` of it. The
    /// returned distance may exceed `search_radius`. Ties go to the lower
    /// index.
    fn nearest_boundary(&self, point: PlanarPoint, search_radius: f64) -> Option<(usize, f64)>;
}

/// A boundary polygon stored in the R-tree with its metadata.
struct BoundaryEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
    rings: Vec<LineString<f64>>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl BoundaryEntry {
    fn new(index: usize, polygon: MultiPolygon<f64>) -> Self {
        let rings = polygon
            .iter()
            .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
            .cloned()
            .collect();
        Self {
            index,
            envelope: compute_envelope(&polygon),
            polygon,
            rings,
        }
    }

    fn boundary_distance(&self, point: &Point<f64>) -> f64 {
        self.rings
            .iter()
            .map(|ring| Euclidean.distance(point, ring))
            .fold(f64::INFINITY, f64::min)
    }
}

/// R-tree backed [`ContainmentIndex`].
pub struct RTreeIndex {
    names: Vec<String>,
    tree: RTree<BoundaryEntry>,
}

impl RTreeIndex {
    /// Indexes every region of `set`.
    #[must_use]
    pub fn build(set: &RegionSet) -> Self {
        let entries: Vec<BoundaryEntry> = set
            .regions
            .iter()
            .enumerate()
            .map(|(i, region)| BoundaryEntry::new(i, region.geometry.clone()))
            .collect();

        log::debug!(
            "Built {} R-tree with {} polygons",
            set.partition,
            entries.len()
        );

        Self {
            names: set.regions.iter().map(|r| r.name.clone()).collect(),
            tree: RTree::bulk_load(entries),
        }
    }
}

impl ContainmentIndex for RTreeIndex {
    fn len(&self) -> usize {
        self.names.len()
    }

    fn region_name(&self, index: usize) -> &str {
        &self.names[index]
    }

    fn containing(&self, point: PlanarPoint) -> Vec<usize> {
        let p = Point::new(point.x, point.y);
        let query_env = AABB::from_point([point.x, point.y]);

        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.contains(&p))
            .map(|entry| entry.index)
            .collect();
        hits.sort_unstable();
        hits
    }

    fn nearest_boundary(&self, point: PlanarPoint, search_radius: f64) -> Option<(usize, f64)> {
        let p = Point::new(point.x, point.y);
        let query_env = AABB::from_corners(
            [point.x - search_radius, point.y - search_radius],
            [point.x + search_radius, point.y + search_radius],
        );

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .map(|entry| (entry.index, entry.boundary_distance(&p)))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
    }
}

/// Exhaustive [`ContainmentIndex`]; every query inspects every polygon.
///
/// Useful for small partitions and as a reference for [`RTreeIndex`].
pub struct LinearIndex {
    names: Vec<String>,
    entries: Vec<BoundaryEntry>,
}

impl LinearIndex {
    /// Indexes every region of `set`.
    #[must_use]
    pub fn build(set: &RegionSet) -> Self {
        Self {
            names: set.regions.iter().map(|r| r.name.clone()).collect(),
            entries: set
                .regions
                .iter()
                .enumerate()
                .map(|(i, region)| BoundaryEntry::new(i, region.geometry.clone()))
                .collect(),
        }
    }
}

impl ContainmentIndex for LinearIndex {
    fn len(&self) -> usize {
        self.names.len()
    }

    fn region_name(&self, index: usize) -> &str {
        &self.names[index]
    }

    fn containing(&self, point: PlanarPoint) -> Vec<usize> {
        let p = Point::new(point.x, point.y);
        self.entries
            .iter()
            .filter(|entry| entry.polygon.contains(&p))
            .map(|entry| entry.index)
            .collect()
    }

    fn nearest_boundary(&self, point: PlanarPoint, search_radius: f64) -> Option<(usize, f64)> {
        let p = Point::new(point.x, point.y);
        let query_env = AABB::from_corners(
            [point.x - search_radius, point.y - search_radius],
            [point.x + search_radius, point.y + search_radius],
        );
        self.entries
            .iter()
            .filter(|entry| entry.envelope.intersects(&query_env))
            .map(|entry| (entry.index, entry.boundary_distance(&p)))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
    }
}

/// Assigns points to the regions of one partition.
pub struct SpatialJoiner<I = RTreeIndex> {
    partition: Partition,
    index: I,
    tolerance_m: f64,
}

impl SpatialJoiner<RTreeIndex> {
    /// Builds an R-tree joiner for `set`.
    #[must_use]
    pub fn from_regions(set: &RegionSet, tolerance_m: f64) -> Self {
        Self::new(set.partition, RTreeIndex::build(set), tolerance_m)
    }
}

impl<I: ContainmentIndex> SpatialJoiner<I> {
    /// Creates a joiner. Negative or non-finite tolerances are treated as
    /// zero.
    #[must_use]
    pub fn new(partition: Partition, index: I, tolerance_m: f64) -> Self {
        let tolerance_m = if tolerance_m.is_finite() {
            tolerance_m.max(0.0)
        } else {
            0.0
        };
        Self {
            partition,
            index,
            tolerance_m,
        }
    }

    /// The partition this joiner assigns to.
    #[must_use]
    pub const fn partition(&self) -> Partition {
        self.partition
    }

    /// The fallback tolerance in meters.
    #[must_use]
    pub const fn tolerance_m(&self) -> f64 {
        self.tolerance_m
    }

    /// Assigns `point` to at most one region.
    #[must_use]
    pub fn assign(&self, point: PlanarPoint) -> RegionAssignment {
        let hits = self.index.containing(point);

        if let Some(&first) = hits.first() {
            let ambiguous = hits.len() > 1;
            if ambiguous {
                let names: Vec<&str> = hits.iter().map(|&i| self.index.region_name(i)).collect();
                log::warn!(
                    "Ambiguous {} containment at ({:.1}, {:.1}): {names:?}; using {}",
                    self.partition,
                    point.x,
                    point.y,
                    names[0]
                );
            }
            return RegionAssignment::Contained {
                region: self.index.region_name(first).to_string(),
                ambiguous,
            };
        }

        match self.index.nearest_boundary(point, self.tolerance_m) {
            Some((index, distance)) if distance <= self.tolerance_m => {
                log::debug!(
                    "{} fallback: ({:.1}, {:.1}) is {distance:.1} m from {}",
                    self.partition,
                    point.x,
                    point.y,
                    self.index.region_name(index)
                );
                RegionAssignment::Nearest {
                    region: self.index.region_name(index).to_string(),
                    distance_m: distance,
                }
            }
            nearest => {
                log::debug!(
                    "Unassigned {} point at ({:.1}, {:.1})",
                    self.partition,
                    point.x,
                    point.y
                );
                RegionAssignment::Unassigned {
                    nearest_distance_m: nearest.map(|(_, d)| d),
                }
            }
        }
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
mod tests {
    use employment_map_boundaries::Region;
    use geo::{LineString, Polygon};

    use super::*;

    fn square(name: &str, x: f64, y: f64, size: f64) -> Region {
        Region {
            name: name.to_string(),
            geometry: MultiPolygon(vec![Polygon::new(
                LineString::from(vec![
                    (x, y),
                    (x + size, y),
                    (x + size, y + size),
                    (x, y + size),
                    (x, y),
                ]),
                vec![],
            )]),
        }
    }

    fn set(regions: Vec<Region>) -> RegionSet {
        RegionSet {
            partition: Partition::Neighborhood,
            name_field: "nomebairro".to_string(),
            regions,
        }
    }

    fn point(x: f64, y: f64) -> PlanarPoint {
        PlanarPoint { x, y }
    }

    fn city() -> RegionSet {
        set(vec![
            square("CENTRO", 0.0, 0.0, 1_000.0),
            square("FATIMA", 1_000.0, 0.0, 1_000.0),
            square("ILHOTAS", 0.0, 1_000.0, 1_000.0),
        ])
    }

    #[test]
    fn contained_point_is_assigned() {
        let joiner = SpatialJoiner::from_regions(&city(), 5.0);
        assert_eq!(
            joiner.assign(point(1_500.0, 500.0)),
            RegionAssignment::Contained {
                region: "FATIMA".to_string(),
                ambiguous: false
            }
        );
    }

    #[test]
    fn point_two_meters_outside_uses_fallback() {
        let joiner = SpatialJoiner::from_regions(&city(), 5.0);
        match joiner.assign(point(500.0, -2.0)) {
            RegionAssignment::Nearest { region, distance_m } => {
                assert_eq!(region, "CENTRO");
                assert!((distance_m - 2.0).abs() < 1e-9);
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn point_ten_meters_outside_is_unassigned() {
        let joiner = SpatialJoiner::from_regions(&city(), 5.0);
        assert!(matches!(
            joiner.assign(point(500.0, -10.0)),
            RegionAssignment::Unassigned { .. }
        ));
    }

    #[test]
    fn far_point_has_no_nearest_distance() {
        let joiner = SpatialJoiner::from_regions(&city(), 5.0);
        assert_eq!(
            joiner.assign(point(50_000.0, 50_000.0)),
            RegionAssignment::Unassigned {
                nearest_distance_m: None
            }
        );
    }

    #[test]
    fn fallback_picks_closest_boundary() {
        let joiner = SpatialJoiner::from_regions(&city(), 50.0);
        // 30 m below FATIMA, 1030 m from ILHOTAS, ~30.4 m from CENTRO's corner.
        let assignment = joiner.assign(point(1_005.0, -30.0));
        assert_eq!(assignment.region(), Some("FATIMA"));
    }

    #[test]
    fn boundary_point_is_assigned_at_zero_tolerance() {
        let joiner = SpatialJoiner::from_regions(&city(), 0.0);
        // On CENTRO's lower edge: not strictly contained by any polygon.
        assert!(matches!(
            joiner.assign(point(500.0, 0.0)),
            RegionAssignment::Nearest { ref region, distance_m } if region == "CENTRO" && distance_m == 0.0
        ));
    }

    #[test]
    fn overlapping_regions_use_first_in_input_order() {
        let overlapping = set(vec![
            square("SUL", 0.0, 0.0, 100.0),
            square("CENTRO", 50.0, 50.0, 100.0),
        ]);
        let joiner = SpatialJoiner::from_regions(&overlapping, 5.0);

        let assignment = joiner.assign(point(75.0, 75.0));
        assert_eq!(
            assignment,
            RegionAssignment::Contained {
                region: "SUL".to_string(),
                ambiguous: true
            }
        );
        assert!(assignment.is_ambiguous());

        assert!(!joiner.assign(point(125.0, 125.0)).is_ambiguous());
    }

    #[test]
    fn hole_is_not_contained() {
        let donut = Region {
            name: "ANEL".to_string(),
            geometry: MultiPolygon(vec![Polygon::new(
                LineString::from(vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0), (0.0, 0.0)]),
                vec![LineString::from(vec![
                    (40.0, 40.0),
                    (60.0, 40.0),
                    (60.0, 60.0),
                    (40.0, 60.0),
                    (40.0, 40.0),
                ])],
            )]),
        };
        let joiner = SpatialJoiner::from_regions(&set(vec![donut]), 5.0);

        // Center of the hole is 10 m from the inner ring.
        assert!(matches!(
            joiner.assign(point(50.0, 50.0)),
            RegionAssignment::Unassigned { nearest_distance_m: Some(d) } if (d - 10.0).abs() < 1e-9
        ));
        // 1 m inside the hole falls back to the inner ring.
        assert_eq!(joiner.assign(point(50.0, 41.0)).region(), Some("ANEL"));
    }

    #[test]
    fn linear_and_rtree_indexes_agree() {
        let regions = city();
        let rtree = SpatialJoiner::new(Partition::Neighborhood, RTreeIndex::build(&regions), 25.0);
        let linear = SpatialJoiner::new(Partition::Neighborhood, LinearIndex::build(&regions), 25.0);

        for x in (-100..=2_100).step_by(37) {
            for y in (-100..=2_100).step_by(41) {
                let p = point(f64::from(x), f64::from(y));
                assert_eq!(rtree.assign(p), linear.assign(p), "disagree at {p:?}");
            }
        }
    }

    #[test]
    fn invalid_tolerance_is_clamped() {
        let joiner = SpatialJoiner::from_regions(&city(), f64::NAN);
        assert!(joiner.tolerance_m().abs() < f64::EPSILON);
        let joiner = SpatialJoiner::from_regions(&city(), -3.0);
        assert!(joiner.tolerance_m().abs() < f64::EPSILON);
    }
}
