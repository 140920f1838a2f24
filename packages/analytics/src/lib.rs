#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Aggregation of employment records by region and year.
//!
//! One generic routine, [`aggregate_partition`], serves both partitions so
//! neighborhoods and zones share the same conservation and tie-break
//! behavior. Records are joined to regions through their postal code's
//! [`PostalCodeSite`]; anything that cannot be attributed lands in the
//! year's [`UnassignedBucket`], split by cause.

pub mod overplot;

use std::collections::{BTreeMap, BTreeSet};

use employment_map_analytics_models::{
    PartitionSummary, RankedEntry, RankedSummary, RegionYearAggregate, TOP_N, UnassignedBucket,
    YearSummary,
};
use employment_map_employment_models::{EmploymentRecord, PostalCode};
use employment_map_geography_models::{Coordinate, Partition};

/// Where one postal code ended up after geocoding and the spatial join.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostalCodeSite {
    /// Resolved coordinate, or `None` if the code is unresolvable.
    pub coordinate: Option<Coordinate>,
    /// Assigned region per partition. A missing partition means the
    /// point was unassigned there.
    pub regions: BTreeMap<Partition, String>,
}

impl PostalCodeSite {
    /// Region assigned in `partition`, if any.
    #[must_use]
    pub fn region(&self, partition: Partition) -> Option<&str> {
        self.regions.get(&partition).map(String::as_str)
    }
}

#[derive(Default)]
struct RegionAccumulator<'a> {
    bonds: u64,
    records: u64,
    postal_codes: BTreeSet<&'a PostalCode>,
    latitude_sum: f64,
    longitude_sum: f64,
}

#[derive(Default)]
struct YearAccumulator<'a> {
    total: u64,
    regions: BTreeMap<&'a str, RegionAccumulator<'a>>,
    unassigned: UnassignedBucket,
}

/// Aggregates `records` into one partition's per-year summaries.
///
/// Postal codes absent from `sites` count as unresolved. For every year,
/// the region totals plus the unassigned total equal the sum of bonds over
/// that year's records.
#[must_use]
pub fn aggregate_partition(
    partition: Partition,
    records: &[EmploymentRecord],
    sites: &BTreeMap<PostalCode, PostalCodeSite>,
) -> PartitionSummary {
    let mut years: BTreeMap<u16, YearAccumulator<'_>> = BTreeMap::new();

    for record in records {
        let year = years.entry(record.year).or_default();
        year.total += record.active_bonds;

        let site = sites.get(&record.postal_code);
        let coordinate = site.and_then(|s| s.coordinate);
        let region = site.and_then(|s| s.region(partition));

        match (coordinate, region) {
            (Some(coordinate), Some(region)) => {
                let acc = year.regions.entry(region).or_default();
                acc.bonds += record.active_bonds;
                acc.records += 1;
                acc.postal_codes.insert(&record.postal_code);
                acc.latitude_sum += coordinate.latitude;
                acc.longitude_sum += coordinate.longitude;
            }
            (None, _) => {
                year.unassigned.unresolved_bonds += record.active_bonds;
                year.unassigned.record_count += 1;
            }
            (Some(_), None) => {
                year.unassigned.outside_bonds += record.active_bonds;
                year.unassigned.record_count += 1;
            }
        }
    }

    let years: Vec<YearSummary> = years
        .into_iter()
        .map(|(year, acc)| summarize_year(partition, year, acc))
        .collect();

    for summary in &years {
        if summary.unassigned.total() > 0 {
            log::info!(
                "{partition} {}: {} of {} bonds unassigned ({} unresolved, {} outside)",
                summary.year,
                summary.unassigned.total(),
                summary.total_bonds,
                summary.unassigned.unresolved_bonds,
                summary.unassigned.outside_bonds,
            );
        }
    }

    PartitionSummary { partition, years }
}

#[allow(clippy::cast_precision_loss)]
fn summarize_year(partition: Partition, year: u16, acc: YearAccumulator<'_>) -> YearSummary {
    let total = acc.total;

    let mut regions: Vec<RegionYearAggregate> = acc
        .regions
        .into_iter()
        .map(|(name, region)| RegionYearAggregate {
            partition,
            region: name.to_string(),
            year,
            active_bonds: region.bonds,
            record_count: region.records,
            postal_codes: region.postal_codes.len() as u64,
            mean_latitude: region.latitude_sum / region.records as f64,
            mean_longitude: region.longitude_sum / region.records as f64,
            share_pct: share_pct(region.bonds, total),
        })
        .collect();
    sort_ranking(&mut regions);

    let assigned: u64 = regions.iter().map(|r| r.active_bonds).sum();
    let region_count = regions.len() as u64;
    let mean_per_region = if region_count == 0 {
        0.0
    } else {
        assigned as f64 / region_count as f64
    };

    YearSummary {
        year,
        total_bonds: total,
        assigned_bonds: assigned,
        unassigned: acc.unassigned,
        unassigned_share_pct: share_pct(acc.unassigned.total(), total),
        region_count,
        mean_per_region,
        top: rank(partition, year, &regions),
        regions,
    }
}

/// Sorts descending by bonds, ties by region name ascending.
pub fn sort_ranking(regions: &mut [RegionYearAggregate]) {
    regions.sort_by(|a, b| {
        b.active_bonds
            .cmp(&a.active_bonds)
            .then_with(|| a.region.cmp(&b.region))
    });
}

/// Builds the top-[`TOP_N`] summary from regions already in ranking order.
#[must_use]
pub fn rank(partition: Partition, year: u16, ranked: &[RegionYearAggregate]) -> RankedSummary {
    RankedSummary {
        partition,
        year,
        entries: ranked
            .iter()
            .take(TOP_N)
            .zip(1..)
            .map(|(region, rank)| RankedEntry {
                rank,
                region: region.region.clone(),
                total: region.active_bonds,
                share_pct: region.share_pct,
            })
            .collect(),
    }
}

/// `part` as a percentage of `total`; zero when `total` is zero.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn share_pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(raw: &str) -> PostalCode {
        PostalCode::parse(raw).unwrap()
    }

    fn record(cep: &str, bonds: u64, year: u16) -> EmploymentRecord {
        EmploymentRecord {
            municipality_id: "2211001".to_string(),
            postal_code: code(cep),
            active_bonds: bonds,
            year,
        }
    }

    fn site(lat: f64, lon: f64, neighborhood: Option<&str>, zone: Option<&str>) -> PostalCodeSite {
        let mut regions = BTreeMap::new();
        if let Some(n) = neighborhood {
            regions.insert(Partition::Neighborhood, n.to_string());
        }
        if let Some(z) = zone {
            regions.insert(Partition::Zone, z.to_string());
        }
        PostalCodeSite {
            coordinate: Some(Coordinate::new(lat, lon)),
            regions,
        }
    }

    #[test]
    fn sums_records_sharing_a_postal_code() {
        // The "not informed" sentinel never becomes a record.
        assert!(PostalCode::parse("99999999").is_err());

        let records = vec![record("64000000", 10, 2023), record("64000000", 5, 2023)];
        let sites = BTreeMap::from([(
            code("64000000"),
            site(-5.09, -42.80, Some("CENTRO"), Some("CENTRO")),
        )]);

        let summary = aggregate_partition(Partition::Neighborhood, &records, &sites);
        let year = summary.year(2023).unwrap();

        assert_eq!(year.total_bonds, 15);
        assert_eq!(year.unassigned.total(), 0);
        assert_eq!(year.regions.len(), 1);
        assert_eq!(year.regions[0].region, "CENTRO");
        assert_eq!(year.regions[0].active_bonds, 15);
        assert_eq!(year.regions[0].record_count, 2);
        assert_eq!(year.regions[0].postal_codes, 1);
        assert!((year.regions[0].share_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn unassigned_is_split_by_cause_and_conserved() {
        let records = vec![
            record("64000000", 10, 2023),
            record("64001000", 7, 2023),
            record("64002000", 3, 2023),
            record("64003000", 4, 2023),
        ];
        let sites = BTreeMap::from([
            (code("64000000"), site(-5.09, -42.80, Some("CENTRO"), None)),
            (code("64001000"), site(-5.20, -42.90, None, None)),
            (
                code("64002000"),
                PostalCodeSite {
                    coordinate: None,
                    regions: BTreeMap::new(),
                },
            ),
        ]);

        let summary = aggregate_partition(Partition::Neighborhood, &records, &sites);
        let year = summary.year(2023).unwrap();

        assert_eq!(year.total_bonds, 24);
        assert_eq!(year.assigned_bonds, 10);
        assert_eq!(year.unassigned.outside_bonds, 7);
        // Unknown to the site map and explicitly unresolved.
        assert_eq!(year.unassigned.unresolved_bonds, 7);
        assert_eq!(year.unassigned.record_count, 3);
        assert_eq!(year.assigned_bonds + year.unassigned.total(), year.total_bonds);
    }

    #[test]
    fn partitions_are_aggregated_independently() {
        let records = vec![record("64000000", 10, 2023)];
        let sites = BTreeMap::from([(code("64000000"), site(-5.09, -42.80, Some("FATIMA"), None))]);

        let neighborhoods = aggregate_partition(Partition::Neighborhood, &records, &sites);
        let zones = aggregate_partition(Partition::Zone, &records, &sites);

        assert_eq!(neighborhoods.year(2023).unwrap().assigned_bonds, 10);
        assert_eq!(zones.year(2023).unwrap().assigned_bonds, 0);
        assert_eq!(zones.year(2023).unwrap().unassigned.outside_bonds, 10);
        assert_eq!(zones.partition, Partition::Zone);
    }

    #[test]
    fn ranking_breaks_ties_by_name_and_keeps_top_five() {
        let ceps = ["64000000", "64001000", "64002000", "64003000", "64004000", "64005000", "64006000"];
        let names = ["JOCKEY", "CENTRO", "FATIMA", "ILHOTAS", "MOCAMBINHO", "PICARRA", "ITARARE"];
        let bonds = [50, 50, 80, 10, 50, 5, 20];

        let records: Vec<_> = ceps.iter().zip(bonds).map(|(c, b)| record(c, b, 2022)).collect();
        let sites: BTreeMap<_, _> = ceps
            .iter()
            .zip(names)
            .map(|(c, n)| (code(c), site(-5.0, -42.8, Some(n), None)))
            .collect();

        let summary = aggregate_partition(Partition::Neighborhood, &records, &sites);
        let top = &summary.year(2022).unwrap().top;

        let order: Vec<_> = top.entries.iter().map(|e| e.region.as_str()).collect();
        assert_eq!(order, ["FATIMA", "CENTRO", "JOCKEY", "MOCAMBINHO", "ITARARE"]);
        assert_eq!(top.entries.len(), TOP_N);
        assert_eq!(top.entries[0].rank, 1);
        assert_eq!(top.entries[4].rank, 5);
        assert!(top.entries.windows(2).all(|w| w[0].total >= w[1].total));
    }

    #[test]
    fn shares_with_unassigned_sum_to_one_hundred() {
        let records = vec![
            record("64000000", 3, 2021),
            record("64001000", 7, 2021),
            record("64002000", 11, 2021),
            record("64003000", 13, 2021),
        ];
        let sites = BTreeMap::from([
            (code("64000000"), site(-5.0, -42.8, Some("A"), None)),
            (code("64001000"), site(-5.0, -42.8, Some("B"), None)),
            (code("64002000"), site(-5.0, -42.8, None, None)),
        ]);

        let summary = aggregate_partition(Partition::Neighborhood, &records, &sites);
        let year = summary.year(2021).unwrap();
        let sum: f64 =
            year.regions.iter().map(|r| r.share_pct).sum::<f64>() + year.unassigned_share_pct;
        assert!((sum - 100.0).abs() < 0.01, "shares sum to {sum}");
    }

    #[test]
    fn years_are_separate_and_ascending() {
        let records = vec![
            record("64000000", 4, 2023),
            record("64000000", 6, 2021),
            record("64000000", 1, 2022),
        ];
        let sites = BTreeMap::from([(code("64000000"), site(-5.0, -42.8, Some("CENTRO"), None))]);

        let summary = aggregate_partition(Partition::Neighborhood, &records, &sites);
        let years: Vec<_> = summary.years.iter().map(|y| (y.year, y.total_bonds)).collect();
        assert_eq!(years, [(2021, 6), (2022, 1), (2023, 4)]);
    }

    #[test]
    fn region_means_use_contributing_records() {
        let records = vec![record("64000000", 1, 2023), record("64001000", 1, 2023)];
        let sites = BTreeMap::from([
            (code("64000000"), site(-5.0, -42.0, Some("CENTRO"), None)),
            (code("64001000"), site(-6.0, -43.0, Some("CENTRO"), None)),
        ]);

        let summary = aggregate_partition(Partition::Neighborhood, &records, &sites);
        let centro = &summary.year(2023).unwrap().regions[0];
        assert!((centro.mean_latitude + 5.5).abs() < 1e-9);
        assert!((centro.mean_longitude + 42.5).abs() < 1e-9);
        assert_eq!(centro.postal_codes, 2);
        assert!((summary.year(2023).unwrap().mean_per_region - 2.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_has_no_years() {
        let summary = aggregate_partition(Partition::Zone, &[], &BTreeMap::new());
        assert!(summary.years.is_empty());
        assert!(share_pct(1, 0).abs() < f64::EPSILON);
    }
}
