#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Aggregation result types, the data-quality report, and the weighted
//! point types consumed by map rendering.
//!
//! Everything here is plain serializable data; the computation lives in
//! `employment_map_analytics`.

use std::collections::BTreeMap;

use employment_map_employment_models::PostalCode;
use employment_map_geography_models::{Coordinate, Partition};
use serde::{Deserialize, Serialize};

/// Maximum number of entries in a [`RankedSummary`].
pub const TOP_N: usize = 5;

/// Summed employment for one region in one year of one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionYearAggregate {
    /// Partition the region belongs to.
    pub partition: Partition,
    /// Region name.
    pub region: String,
    /// Reference year.
    pub year: u16,
    /// Sum of active bonds.
    pub active_bonds: u64,
    /// Number of contributing records.
    pub record_count: u64,
    /// Number of distinct contributing postal codes.
    pub postal_codes: u64,
    /// Mean latitude of contributing records.
    pub mean_latitude: f64,
    /// Mean longitude of contributing records.
    pub mean_longitude: f64,
    /// Share of the partition-year total (unassigned included), in percent.
    pub share_pct: f64,
}

/// One row of a [`RankedSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    /// 1-based rank.
    pub rank: u32,
    /// Region name.
    pub region: String,
    /// Sum of active bonds.
    pub total: u64,
    /// Share of the partition-year total, in percent.
    pub share_pct: f64,
}

/// Top regions of one partition in one year.
///
/// Sorted descending by total, ties by region name ascending, at most
/// [`TOP_N`] entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedSummary {
    /// Partition.
    pub partition: Partition,
    /// Reference year.
    pub year: u16,
    /// Ranked entries.
    pub entries: Vec<RankedEntry>,
}

/// Employment that could not be attributed to any region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnassignedBucket {
    /// Bonds whose postal code has no resolved coordinate.
    pub unresolved_bonds: u64,
    /// Bonds whose coordinate fell outside every region and tolerance.
    pub outside_bonds: u64,
    /// Number of records in the bucket.
    pub record_count: u64,
}

impl UnassignedBucket {
    /// Total unassigned bonds.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.unresolved_bonds + self.outside_bonds
    }
}

/// Everything known about one partition in one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSummary {
    /// Reference year.
    pub year: u16,
    /// Sum of bonds over all accepted records of the year.
    pub total_bonds: u64,
    /// Sum of bonds attributed to regions.
    pub assigned_bonds: u64,
    /// Unattributed bonds.
    pub unassigned: UnassignedBucket,
    /// Unassigned share of the total, in percent.
    pub unassigned_share_pct: f64,
    /// Number of regions with at least one record.
    pub region_count: u64,
    /// Mean bonds per region with at least one record.
    pub mean_per_region: f64,
    /// All regions, in ranking order.
    pub regions: Vec<RegionYearAggregate>,
    /// The top regions.
    pub top: RankedSummary,
}

/// Aggregation output for one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionSummary {
    /// Partition.
    pub partition: Partition,
    /// One entry per year, ascending.
    pub years: Vec<YearSummary>,
}

impl PartitionSummary {
    /// Returns the summary for `year`, if any records exist for it.
    #[must_use]
    pub fn year(&self, year: u16) -> Option<&YearSummary> {
        self.years.iter().find(|y| y.year == year)
    }
}

/// Per-partition data-quality counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionQuality {
    /// Postal codes contained by more than one region.
    pub ambiguous_containments: u64,
    /// Postal codes assigned through the nearest-boundary fallback.
    pub nearest_fallbacks: u64,
    /// Resolved postal codes left unassigned.
    pub unassigned_points: u64,
}

/// Counts per error kind for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    /// Rows read from the input.
    pub records_read: u64,
    /// Rows that became records for the configured municipality.
    pub records_accepted: u64,
    /// Rows for other municipalities.
    pub other_municipality: u64,
    /// Valid rows outside the configured years.
    pub other_year: u64,
    /// Rows whose postal code was rejected by the normalizer.
    pub invalid_postal_codes: u64,
    /// Rows with a zero or negative bond count.
    pub non_positive_bonds: u64,
    /// Rows with an unparseable bond count or year, or a CSV decode error.
    pub malformed_rows: u64,
    /// Distinct accepted postal codes.
    pub unique_postal_codes: u64,
    /// Postal codes answered from the persisted cache.
    pub cache_hits: u64,
    /// Postal codes resolved by the geocoder during this run.
    pub newly_resolved: u64,
    /// Postal codes without a coordinate (new or cached failures).
    pub unresolvable_codes: u64,
    /// Per-partition spatial join counters.
    pub partitions: BTreeMap<Partition, PartitionQuality>,
}

/// A postal code marker weighted for rendering density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedPoint {
    /// Postal code.
    pub postal_code: PostalCode,
    /// Reference year.
    pub year: u16,
    /// Coordinate (WGS84).
    pub coordinate: Coordinate,
    /// Summed bonds at this postal code.
    pub total: u64,
    /// Normalized weight in `[0, 1]`.
    pub weight: f64,
    /// Marker size.
    pub marker_size: f64,
    /// Marker opacity.
    pub alpha: f64,
    /// Neighborhood the postal code was assigned to.
    pub neighborhood: Option<String>,
    /// Zone the postal code was assigned to.
    pub zone: Option<String>,
}

/// One dot of a dot-density rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DotPoint {
    /// Postal code the dot belongs to.
    pub postal_code: PostalCode,
    /// Reference year.
    pub year: u16,
    /// Dot index within the postal code.
    pub index: u32,
    /// Jittered coordinate (WGS84).
    pub coordinate: Coordinate,
}
