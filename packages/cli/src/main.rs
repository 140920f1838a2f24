#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the employment map pipeline.
//!
//! Uses `indicatif-log-bridge` (via [`employment_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use employment_map_cli_utils::{Phase, PhaseBar, init_logger, run_progress};
use employment_map_employment_models::PostalCode;
use employment_map_geocoder::service_registry::all_services;
use employment_map_pipeline::config::PipelineConfig;
use employment_map_pipeline::progress::ProgressCallback;
use employment_map_pipeline::{build_geocoder, open_cache};

#[derive(Parser)]
#[command(name = "employment_map", about = "Formal employment by region for Teresina")]
struct Cli {
    /// Configuration file (overrides `EMPLOYMENT_MAP_CONFIG`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: geocode, assign regions, aggregate, write outputs
    Run,
    /// Resolve the input's postal codes and persist the cache, nothing else
    Geocode,
    /// Remove cache entries so they are resolved again on the next run
    Invalidate {
        /// Postal code to drop (repeatable)
        #[arg(long = "code")]
        codes: Vec<String>,
        /// Drop every cached failure
        #[arg(long)]
        unresolved: bool,
    },
    /// Show coordinate cache counts
    CacheStats,
    /// List the embedded geocoding services
    Services,
    /// Merge a legacy JSON cache into the coordinate cache
    ImportLegacy {
        /// Legacy `{"<cep>": {"lat": .., "lon": .., "source": ..}}` file
        path: PathBuf,
    },
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => {
            let start = Instant::now();
            let geocoder = build_geocoder(&config.geocoding)?;
            let progress = run_progress(&multi);

            let (output, written) =
                employment_map_pipeline::run_and_write(&config, &geocoder, &progress).await?;

            let q = &output.quality;
            println!("{:<28} COUNT", "QUALITY");
            println!("{}", "-".repeat(40));
            println!("{:<28} {}", "records read", q.records_read);
            println!("{:<28} {}", "records accepted", q.records_accepted);
            println!("{:<28} {}", "other municipality", q.other_municipality);
            println!("{:<28} {}", "other year", q.other_year);
            println!("{:<28} {}", "invalid postal codes", q.invalid_postal_codes);
            println!("{:<28} {}", "non-positive bonds", q.non_positive_bonds);
            println!("{:<28} {}", "malformed rows", q.malformed_rows);
            println!("{:<28} {}", "unique postal codes", q.unique_postal_codes);
            println!("{:<28} {}", "cache hits", q.cache_hits);
            println!("{:<28} {}", "newly resolved", q.newly_resolved);
            println!("{:<28} {}", "unresolvable codes", q.unresolvable_codes);
            for (partition, counters) in &q.partitions {
                println!(
                    "{:<28} {}",
                    format!("{partition} ambiguous"),
                    counters.ambiguous_containments
                );
                println!(
                    "{:<28} {}",
                    format!("{partition} nearest fallback"),
                    counters.nearest_fallbacks
                );
                println!(
                    "{:<28} {}",
                    format!("{partition} unassigned"),
                    counters.unassigned_points
                );
            }

            for summary in &output.summaries {
                for year in &summary.years {
                    println!();
                    println!("{} {} (total {})", summary.partition, year.year, year.total_bonds);
                    for entry in &year.top.entries {
                        println!(
                            "  {}. {:<30} {:>8} {:>6.2}%",
                            entry.rank, entry.region, entry.total, entry.share_pct
                        );
                    }
                    println!(
                        "     {:<30} {:>8} {:>6.2}%",
                        "(unassigned)",
                        year.unassigned.total(),
                        year.unassigned_share_pct
                    );
                }
            }

            log::info!(
                "Wrote {} files in {:.1}s",
                written.len(),
                start.elapsed().as_secs_f64()
            );
        }
        Commands::Geocode => {
            let geocoder = build_geocoder(&config.geocoding)?;
            let progress: Arc<dyn ProgressCallback> =
                Arc::new(PhaseBar::new(&multi, Phase::Geocode));
            let tally = employment_map_pipeline::geocode(&config, &geocoder, &progress).await?;
            log::info!(
                "Geocoding complete: {} cached, {} new, {} unresolvable",
                tally.cache_hits,
                tally.newly_resolved,
                tally.unresolvable
            );
        }
        Commands::Invalidate { codes, unresolved } => {
            if codes.is_empty() && !unresolved {
                return Err("nothing to invalidate: pass --code <CEP> or --unresolved".into());
            }

            let codes = codes
                .iter()
                .map(|raw| PostalCode::parse(raw))
                .collect::<Result<Vec<_>, _>>()?;

            let cache = open_cache(&config.cache)?;
            let mut removed = 0;
            for code in &codes {
                if cache.invalidate(code) {
                    removed += 1;
                } else {
                    log::warn!("{code} is not cached");
                }
            }
            if unresolved {
                removed += cache.invalidate_unresolved();
            }

            cache.persist().await?;
            log::info!("Invalidated {removed} cache entries");
        }
        Commands::CacheStats => {
            let stats = open_cache(&config.cache)?.stats();
            println!("{:<24} COUNT", "CACHE");
            println!("{}", "-".repeat(36));
            println!("{:<24} {}", "total", stats.total);
            println!("{:<24} {}", "resolved", stats.resolved);
            println!("{:<24} {}", "unresolved", stats.unresolved);
            for (source, count) in &stats.by_source {
                println!("{:<24} {count}", format!("  {source}"));
            }
        }
        Commands::Services => {
            let mut services = all_services();
            services.sort_by_key(|s| s.priority);
            println!("{:<22} {:<9} {:<8} NAME", "ID", "PRIORITY", "ENABLED");
            println!("{}", "-".repeat(70));
            for svc in &services {
                println!(
                    "{:<22} {:<9} {:<8} {}",
                    svc.id, svc.priority, svc.enabled, svc.name
                );
            }
        }
        Commands::ImportLegacy { path } => {
            let cache = open_cache(&config.cache)?;
            let added = cache.import_legacy(&path)?;
            cache.persist().await?;
            log::info!("Imported {added} entries into {}", config.cache.path.display());
        }
    }

    Ok(())
}
