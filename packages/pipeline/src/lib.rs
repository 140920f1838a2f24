#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! End-to-end employment map pipeline.
//!
//! records → normalized postal codes → coordinate cache → spatial join
//! against both partitions → per-partition aggregation → weighted points
//! and output files.
//!
//! Structural failures (unreadable input, bad boundary files, a corrupt
//! cache) abort with [`PipelineError`]. Everything per-record is counted
//! in the [`QualityReport`] instead.

pub mod config;
pub mod input;
pub mod output;
pub mod progress;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use employment_map_analytics::overplot::{dot_density, weighted_points};
use employment_map_analytics::{PostalCodeSite, aggregate_partition};
use employment_map_analytics_models::{
    DotPoint, PartitionQuality, PartitionSummary, QualityReport, WeightedPoint,
};
use employment_map_boundaries::{BoundaryError, UtmProjection, load_partition};
use employment_map_cache::{CacheEntry, CacheError, CoordinateCache};
use employment_map_employment_models::{EmploymentRecord, PostalCode};
use employment_map_geocoder::service_registry::{build_chain, enabled_services};
use employment_map_geocoder::{GeocodeError, PostalGeocoder, ProviderChain};
use employment_map_geography_models::{Partition, PlanarPoint, RegionAssignment};
use employment_map_spatial::SpatialJoiner;
use thiserror::Error;

use crate::config::{CacheConfig, GeocodingConfig, PipelineConfig};
use crate::progress::{ProgressCallback, RunProgress};

/// Fatal pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The configuration file is not valid TOML or has wrong types.
    #[error("Invalid configuration {path}: {source}")]
    Config {
        /// Configuration file.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: toml::de::Error,
    },

    /// A file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// CSV input or output failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The coordinate cache could not be loaded or persisted.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A boundary file could not be loaded.
    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    /// The geocoding providers could not be set up.
    #[error(transparent)]
    Geocode(#[from] GeocodeError),
}

/// Everything a run produces.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// Counts per error kind.
    pub quality: QualityReport,
    /// One summary per partition.
    pub summaries: Vec<PartitionSummary>,
    /// Weighted markers per year.
    pub points: BTreeMap<u16, Vec<WeightedPoint>>,
    /// Dot-density points per year.
    pub dots: BTreeMap<u16, Vec<DotPoint>>,
    /// Cache entries of the run's postal codes, by postal code.
    pub coordinates: Vec<CacheEntry>,
}

/// Outcome counters of [`resolve_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeocodeTally {
    /// Codes answered by an existing entry.
    pub cache_hits: u64,
    /// Codes resolved by the geocoder in this call.
    pub newly_resolved: u64,
    /// Codes without a coordinate, new or cached.
    pub unresolvable: u64,
}

/// Builds the geocoding provider chain from the embedded service registry.
///
/// # Errors
///
/// Returns [`PipelineError::Geocode`] for unknown service ids or if the
/// HTTP client cannot be built.
pub fn build_geocoder(config: &GeocodingConfig) -> Result<ProviderChain, PipelineError> {
    let services = enabled_services(config.services.as_deref())?;
    let chain = build_chain(&services, &config.settings())?;
    log::info!("Geocoding providers: {}", chain.provider_ids().join(", "));
    Ok(chain)
}

/// Opens the configured coordinate cache.
///
/// # Errors
///
/// Returns [`PipelineError::Cache`] if the cache file is corrupt.
pub fn open_cache(config: &CacheConfig) -> Result<CoordinateCache, PipelineError> {
    Ok(CoordinateCache::load(&config.path, config.options())?)
}

/// Resolves every code in `codes` through `cache`, at most `concurrency`
/// at a time. Returns the entries sorted by postal code.
///
/// # Errors
///
/// Returns [`PipelineError::Cache`] if a checkpoint fails.
pub async fn resolve_all(
    cache: &CoordinateCache,
    codes: &[PostalCode],
    geocoder: &dyn PostalGeocoder,
    concurrency: usize,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<(Vec<CacheEntry>, GeocodeTally), PipelineError> {
    use futures::stream::{self, StreamExt as _};

    progress.set_message(format!("Resolving {} postal codes", codes.len()));
    progress.set_total(codes.len() as u64);
    log::info!(
        "Resolving {} postal codes (concurrency={})...",
        codes.len(),
        concurrency.max(1)
    );

    let results: Vec<_> = stream::iter(
        codes
            .iter()
            .map(|code| async move { cache.lookup(code, geocoder).await }),
    )
    .buffer_unordered(concurrency.max(1))
    .inspect(|_| progress.inc(1))
    .collect()
    .await;

    let mut tally = GeocodeTally::default();
    let mut entries = Vec::with_capacity(results.len());

    for result in results {
        let lookup = result?;
        if lookup.fresh {
            if lookup.entry.is_resolved() {
                tally.newly_resolved += 1;
            } else {
                log::warn!("UnresolvableCode: {}", lookup.entry.postal_code);
            }
        } else {
            tally.cache_hits += 1;
        }
        if !lookup.entry.is_resolved() {
            tally.unresolvable += 1;
        }
        entries.push(lookup.entry);
    }
    entries.sort_by(|a, b| a.postal_code.cmp(&b.postal_code));

    progress.finish(format!(
        "{} postal codes: {} cached, {} new, {} unresolvable",
        codes.len(),
        tally.cache_hits,
        tally.newly_resolved,
        tally.unresolvable
    ));
    Ok((entries, tally))
}

/// Loads both partitions and builds one joiner per partition, in
/// [`Partition::ALL`] order.
///
/// # Errors
///
/// Returns [`PipelineError::Boundary`] if a boundary file cannot be used.
pub fn load_joiners(config: &PipelineConfig) -> Result<Vec<SpatialJoiner>, PipelineError> {
    let projection = config.spatial.projection()?;
    Partition::ALL
        .iter()
        .map(|&partition| {
            let regions = load_partition(partition, config.partitions.source(partition), &projection)?;
            Ok(SpatialJoiner::from_regions(&regions, config.spatial.tolerance_m))
        })
        .collect()
}

/// Assigns every resolved entry to a region of each partition and counts
/// the join outcomes into `quality`. Partitions are joined one after the
/// other.
pub fn assign_sites(
    entries: &[CacheEntry],
    joiners: &[SpatialJoiner],
    projection: &UtmProjection,
    quality: &mut QualityReport,
    progress: &Arc<dyn ProgressCallback>,
) -> BTreeMap<PostalCode, PostalCodeSite> {
    let mut sites: BTreeMap<PostalCode, PostalCodeSite> = entries
        .iter()
        .map(|entry| {
            let site = PostalCodeSite {
                coordinate: entry.coordinate,
                regions: BTreeMap::new(),
            };
            (entry.postal_code.clone(), site)
        })
        .collect();
    let points: Vec<(&PostalCode, PlanarPoint)> = entries
        .iter()
        .filter_map(|entry| {
            entry
                .coordinate
                .map(|c| (&entry.postal_code, projection.project(c)))
        })
        .collect();

    progress.set_total((points.len() * joiners.len()) as u64);

    for joiner in joiners {
        let partition = joiner.partition();
        progress.set_message(format!("Joining {} postal codes to {partition}", points.len()));
        let counters: &mut PartitionQuality = quality.partitions.entry(partition).or_default();

        for &(code, point) in &points {
            let region = match joiner.assign(point) {
                RegionAssignment::Contained { region, ambiguous } => {
                    if ambiguous {
                        log::warn!(
                            "AmbiguousContainment: {code} in {partition} (first match {region})"
                        );
                        counters.ambiguous_containments += 1;
                    }
                    Some(region)
                }
                RegionAssignment::Nearest { region, .. } => {
                    counters.nearest_fallbacks += 1;
                    Some(region)
                }
                RegionAssignment::Unassigned { nearest_distance_m } => {
                    log::warn!(
                        "UnassignedPoint: {code} in {partition} (nearest boundary {})",
                        nearest_distance_m.map_or_else(
                            || "not within search radius".to_string(),
                            |d| format!("{d:.1} m")
                        )
                    );
                    counters.unassigned_points += 1;
                    None
                }
            };

            if let (Some(region), Some(site)) = (region, sites.get_mut(code)) {
                site.regions.insert(partition, region);
            }
            progress.inc(1);
        }
    }

    progress.finish(format!(
        "Joined {} postal codes to {} partitions",
        points.len(),
        joiners.len()
    ));
    sites
}

/// Resolves the input's postal codes and persists the cache, without the
/// spatial join.
///
/// # Errors
///
/// Returns [`PipelineError`] on unreadable input or cache failures.
pub async fn geocode(
    config: &PipelineConfig,
    geocoder: &dyn PostalGeocoder,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<GeocodeTally, PipelineError> {
    let input = input::read_records(&config.input)?;
    let codes = unique_codes(&input.records);

    let cache = open_cache(&config.cache)?;
    let (_, tally) = resolve_all(&cache, &codes, geocoder, config.cache.concurrency, progress).await?;
    cache.persist().await?;
    Ok(tally)
}

/// Runs the whole pipeline and returns its results without writing them.
///
/// Boundaries are loaded before any geocoding so a bad boundary file
/// fails fast.
///
/// # Errors
///
/// Returns [`PipelineError`] on any structural failure.
pub async fn run(
    config: &PipelineConfig,
    geocoder: &dyn PostalGeocoder,
    progress: &RunProgress,
) -> Result<RunOutput, PipelineError> {
    let input = input::read_records(&config.input)?;
    let mut quality = input.quality;
    let records = input.records;

    let projection = config.spatial.projection()?;
    let joiners = load_joiners(config)?;

    let codes = unique_codes(&records);
    quality.unique_postal_codes = codes.len() as u64;

    let cache = open_cache(&config.cache)?;
    let (coordinates, tally) = resolve_all(
        &cache,
        &codes,
        geocoder,
        config.cache.concurrency,
        &progress.geocode,
    )
    .await?;
    cache.persist().await?;

    quality.cache_hits = tally.cache_hits;
    quality.newly_resolved = tally.newly_resolved;
    quality.unresolvable_codes = tally.unresolvable;

    let sites = assign_sites(
        &coordinates,
        &joiners,
        &projection,
        &mut quality,
        &progress.join,
    );

    let years: BTreeSet<u16> = records.iter().map(|r| r.year).collect();
    let aggregate = &progress.aggregate;
    aggregate.set_total((Partition::ALL.len() + years.len()) as u64);

    let summaries: Vec<PartitionSummary> = Partition::ALL
        .iter()
        .map(|&partition| {
            aggregate.set_message(format!("Aggregating {partition}"));
            let summary = aggregate_partition(partition, &records, &sites);
            aggregate.inc(1);
            summary
        })
        .collect();

    let mut points = BTreeMap::new();
    let mut dots = BTreeMap::new();
    for &year in &years {
        aggregate.set_message(format!("Weighting {year} points"));
        let year_points = weighted_points(&config.overplot, year, &records, &sites);
        dots.insert(year, dot_density(&config.overplot, &year_points));
        points.insert(year, year_points);
        aggregate.inc(1);
    }
    aggregate.finish(format!(
        "Aggregated {} partitions over {} years",
        summaries.len(),
        years.len()
    ));

    log::info!(
        "Run complete: {} records, {} postal codes ({} unresolvable)",
        quality.records_accepted,
        quality.unique_postal_codes,
        quality.unresolvable_codes
    );

    Ok(RunOutput {
        quality,
        summaries,
        points,
        dots,
        coordinates,
    })
}

/// [`run`], then writes every output into the configured directory.
///
/// # Errors
///
/// Returns [`PipelineError`] on any structural failure.
pub async fn run_and_write(
    config: &PipelineConfig,
    geocoder: &dyn PostalGeocoder,
    progress: &RunProgress,
) -> Result<(RunOutput, Vec<PathBuf>), PipelineError> {
    let output = run(config, geocoder, progress).await?;
    let written = output::write_all(&config.output.dir, &output)?;
    Ok((output, written))
}

fn unique_codes(records: &[EmploymentRecord]) -> Vec<PostalCode> {
    records
        .iter()
        .map(|r| r.postal_code.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
