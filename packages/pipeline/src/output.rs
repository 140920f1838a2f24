//! Output files.
//!
//! | File | Contents |
//! |---|---|
//! | `summary_<partition>.json` | [`PartitionSummary`] |
//! | `points_<year>.geojson` | weighted postal-code markers |
//! | `dots_<year>.geojson` | dot-density points |
//! | `postal_code_coordinates.csv` | resolved postal codes used by the run |
//! | `quality_report.json` | [`QualityReport`] |

use std::path::{Path, PathBuf};

use employment_map_analytics_models::{DotPoint, PartitionSummary, QualityReport, WeightedPoint};
use employment_map_cache::CacheEntry;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::Serialize;

use crate::{PipelineError, RunOutput};

/// Name of the de-duplicated coordinate table.
pub const COORDINATES_FILE: &str = "postal_code_coordinates.csv";

/// Name of the quality report.
pub const QUALITY_REPORT_FILE: &str = "quality_report.json";

/// Writes every output of a run into `dir`, creating it if needed.
/// Returns the written paths.
///
/// # Errors
///
/// Returns [`PipelineError`] if a file cannot be written.
pub fn write_all(dir: &Path, output: &RunOutput) -> Result<Vec<PathBuf>, PipelineError> {
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut written = Vec::new();

    for summary in &output.summaries {
        let path = dir.join(format!("summary_{}.json", summary.partition));
        write_json(&path, summary)?;
        written.push(path);
    }

    for (year, points) in &output.points {
        let path = dir.join(format!("points_{year}.geojson"));
        write_text(&path, &points_collection(points).to_string())?;
        written.push(path);
    }

    for (year, dots) in &output.dots {
        let path = dir.join(format!("dots_{year}.geojson"));
        write_text(&path, &dots_collection(dots).to_string())?;
        written.push(path);
    }

    let path = dir.join(COORDINATES_FILE);
    write_coordinates(&path, &output.coordinates)?;
    written.push(path);

    let path = dir.join(QUALITY_REPORT_FILE);
    write_json(&path, &output.quality)?;
    written.push(path);

    log::info!("Wrote {} files to {}", written.len(), dir.display());
    Ok(written)
}

fn write_text(path: &Path, contents: &str) -> Result<(), PipelineError> {
    std::fs::write(path, contents).map_err(|e| PipelineError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    write_text(path, &serde_json::to_string_pretty(value)?)
}

fn point_feature(latitude: f64, longitude: f64, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![longitude, latitude]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Weighted markers as a WGS84 feature collection.
#[must_use]
pub fn points_collection(points: &[WeightedPoint]) -> FeatureCollection {
    let features = points
        .iter()
        .map(|p| {
            let mut props = JsonObject::new();
            props.insert("postalCode".into(), p.postal_code.as_str().into());
            props.insert("year".into(), p.year.into());
            props.insert("total".into(), p.total.into());
            props.insert("weight".into(), p.weight.into());
            props.insert("markerSize".into(), p.marker_size.into());
            props.insert("alpha".into(), p.alpha.into());
            props.insert("neighborhood".into(), p.neighborhood.clone().into());
            props.insert("zone".into(), p.zone.clone().into());
            point_feature(p.coordinate.latitude, p.coordinate.longitude, props)
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Dot-density points as a WGS84 feature collection.
#[must_use]
pub fn dots_collection(dots: &[DotPoint]) -> FeatureCollection {
    let features = dots
        .iter()
        .map(|d| {
            let mut props = JsonObject::new();
            props.insert("postalCode".into(), d.postal_code.as_str().into());
            props.insert("year".into(), d.year.into());
            props.insert("index".into(), d.index.into());
            point_feature(d.coordinate.latitude, d.coordinate.longitude, props)
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[derive(Serialize)]
struct CoordinateRow<'a> {
    postal_code: &'a str,
    latitude: f64,
    longitude: f64,
    source: &'a str,
}

/// Writes resolved entries as `postal_code,latitude,longitude,source`,
/// skipping unresolved ones.
fn write_coordinates(path: &Path, entries: &[CacheEntry]) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_path(path)?;
    for entry in entries {
        let Some(coordinate) = entry.coordinate else {
            continue;
        };
        writer.serialize(CoordinateRow {
            postal_code: entry.postal_code.as_str(),
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            source: entry.source.as_deref().unwrap_or_default(),
        })?;
    }
    writer.flush().map_err(|e| PipelineError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
