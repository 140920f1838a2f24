//! Visual weighting of postal-code totals for map rendering.
//!
//! Busy postal codes would saturate a map if every marker had the same
//! size and opacity, so each total is mapped through a nonlinear scale to
//! a bounded weight. Dot-density output spreads a code's dots around its
//! coordinate with a jitter derived from a hash of the code, year, and dot
//! index, so identical inputs always produce identical dots.

use std::collections::BTreeMap;

use employment_map_analytics_models::{DotPoint, WeightedPoint};
use employment_map_employment_models::{EmploymentRecord, PostalCode};
use employment_map_geography_models::{Coordinate, Partition};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::PostalCodeSite;

/// Nonlinear scale applied before normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightScale {
    /// Square root.
    #[default]
    Sqrt,
    /// `ln(1 + x)`.
    Log,
}

impl WeightScale {
    fn apply(self, value: f64) -> f64 {
        match self {
            Self::Sqrt => value.sqrt(),
            Self::Log => value.ln_1p(),
        }
    }
}

/// Marker and dot-density parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverplotConfig {
    /// Scale applied to totals.
    pub scale: WeightScale,
    /// Total that maps to weight 1.0; larger totals are clamped.
    pub reference_total: u64,
    /// Marker size at weight 0.
    pub min_size: f64,
    /// Marker size at weight 1.
    pub max_size: f64,
    /// Opacity at weight 0.
    pub min_alpha: f64,
    /// Opacity at weight 1.
    pub max_alpha: f64,
    /// Bonds represented by one dot.
    pub bonds_per_dot: u64,
    /// Totals at or above this use half as many dots.
    pub dense_threshold: u64,
    /// Maximum jitter in degrees, applied independently to latitude and
    /// longitude.
    pub jitter_degrees: f64,
}

impl Default for OverplotConfig {
    fn default() -> Self {
        Self {
            scale: WeightScale::Sqrt,
            reference_total: 20_000,
            min_size: 8.0,
            max_size: 90.0,
            min_alpha: 0.1,
            max_alpha: 0.88,
            bonds_per_dot: 1_000,
            dense_threshold: 5_000,
            jitter_degrees: 0.000_15,
        }
    }
}

impl OverplotConfig {
    /// Weight in `[0, 1]` for a postal-code total. Monotonic in `total`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn weight(&self, total: u64) -> f64 {
        let reference = self.scale.apply(self.reference_total.max(1) as f64);
        (self.scale.apply(total as f64) / reference).clamp(0.0, 1.0)
    }

    /// Marker size and opacity for a weight.
    #[must_use]
    pub fn marker(&self, weight: f64) -> (f64, f64) {
        (
            (self.max_size - self.min_size).mul_add(weight, self.min_size),
            (self.max_alpha - self.min_alpha).mul_add(weight, self.min_alpha),
        )
    }

    /// Number of dots drawn for a postal-code total. At least one.
    #[must_use]
    pub fn dot_count(&self, total: u64) -> u32 {
        let per_dot = self.bonds_per_dot.max(1);
        let per_dot = if total >= self.dense_threshold {
            per_dot.saturating_mul(2)
        } else {
            per_dot
        };
        // Round half up.
        let dots = total.saturating_add(per_dot / 2) / per_dot;
        u32::try_from(dots).unwrap_or(u32::MAX).max(1)
    }

    /// Deterministic jittered coordinate for dot `index` of `postal_code`.
    #[must_use]
    pub fn jitter(
        &self,
        postal_code: &PostalCode,
        year: u16,
        index: u32,
        origin: Coordinate,
    ) -> Coordinate {
        let digest = Sha256::new()
            .chain_update(postal_code.as_str())
            .chain_update(year.to_be_bytes())
            .chain_update(index.to_be_bytes())
            .finalize();

        let (lat_bytes, rest) = digest.split_at(8);
        let lon_bytes = &rest[..8];

        Coordinate::new(
            origin.latitude + self.jitter_degrees * unit_offset(lat_bytes),
            origin.longitude + self.jitter_degrees * unit_offset(lon_bytes),
        )
    }
}

/// Maps eight hash bytes to `[-1, 1]`.
#[allow(clippy::cast_precision_loss)]
fn unit_offset(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    let fraction = (u64::from_be_bytes(buf) >> 11) as f64 / (1u64 << 53) as f64;
    fraction.mul_add(2.0, -1.0)
}

/// Sums bonds per (year, postal code).
#[must_use]
pub fn totals_by_postal_code(records: &[EmploymentRecord]) -> BTreeMap<(u16, &PostalCode), u64> {
    let mut totals = BTreeMap::new();
    for record in records {
        *totals.entry((record.year, &record.postal_code)).or_insert(0) += record.active_bonds;
    }
    totals
}

/// Weighted marker per resolved postal code for `year`, descending by
/// total then ascending by postal code.
#[must_use]
pub fn weighted_points(
    config: &OverplotConfig,
    year: u16,
    records: &[EmploymentRecord],
    sites: &BTreeMap<PostalCode, PostalCodeSite>,
) -> Vec<WeightedPoint> {
    let mut points: Vec<WeightedPoint> = totals_by_postal_code(records)
        .into_iter()
        .filter(|((y, _), _)| *y == year)
        .filter_map(|((_, code), total)| {
            let site = sites.get(code)?;
            let coordinate = site.coordinate?;
            let weight = config.weight(total);
            let (marker_size, alpha) = config.marker(weight);
            Some(WeightedPoint {
                postal_code: code.clone(),
                year,
                coordinate,
                total,
                weight,
                marker_size,
                alpha,
                neighborhood: site.region(Partition::Neighborhood).map(str::to_string),
                zone: site.region(Partition::Zone).map(str::to_string),
            })
        })
        .collect();

    points.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.postal_code.cmp(&b.postal_code))
    });
    points
}

/// Expands weighted points into jittered dots.
#[must_use]
pub fn dot_density(config: &OverplotConfig, points: &[WeightedPoint]) -> Vec<DotPoint> {
    points
        .iter()
        .flat_map(|point| {
            (0..config.dot_count(point.total)).map(move |index| DotPoint {
                postal_code: point.postal_code.clone(),
                year: point.year,
                index,
                coordinate: config.jitter(&point.postal_code, point.year, index, point.coordinate),
            })
        })
        .collect()
}
