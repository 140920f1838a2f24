//! Durable cache representation.
//!
//! The cache file is a CSV with one row per postal code:
//!
//! ```text
//! postal_code,latitude,longitude,resolved,source,resolved_at
//! 64000040,-5.0892,-42.8019,true,viacep+nominatim,2024-03-01T12:00:00Z
//! 64099999,,,false,,2024-03-01T12:00:05Z
//! ```
//!
//! Writes go to a sibling temporary file that is synced and then renamed
//! over the target, so a reader sees either the old file or the new one.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use employment_map_employment_models::PostalCode;
use employment_map_geography_models::Coordinate;
use serde::{Deserialize, Serialize};

use crate::{CacheEntry, CacheError};

/// Source tags of the legacy JSON cache that mark a city-wide placeholder
/// rather than a real resolution.
const LEGACY_PLACEHOLDER_SOURCES: &[&str] = &["fallback_geral"];

/// Prefix of the address sub-cache keys in the legacy JSON format.
const LEGACY_ADDRESS_KEY_PREFIX: &str = "addr_";

/// One CSV row.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRow {
    postal_code: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    resolved: bool,
    source: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
}

impl From<&CacheEntry> for CacheRow {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            postal_code: entry.postal_code.to_string(),
            latitude: entry.coordinate.map(|c| c.latitude),
            longitude: entry.coordinate.map(|c| c.longitude),
            resolved: entry.is_resolved(),
            source: entry.source.clone(),
            resolved_at: entry.resolved_at,
        }
    }
}

impl CacheRow {
    fn into_entry(self, path: &Path, line: u64) -> Result<CacheEntry, CacheError> {
        let corrupt = |message: String| CacheError::Corrupt {
            path: path.to_path_buf(),
            line,
            message,
        };

        let postal_code = PostalCode::parse(&self.postal_code)
            .map_err(|e| corrupt(format!("postal code {:?}: {e}", self.postal_code)))?;

        let coordinate = match (self.resolved, self.latitude, self.longitude) {
            (true, Some(latitude), Some(longitude)) => {
                let coordinate = Coordinate::new(latitude, longitude);
                if !coordinate.is_valid() {
                    return Err(corrupt(format!(
                        "coordinate {latitude}, {longitude} out of range"
                    )));
                }
                Some(coordinate)
            }
            (true, _, _) => {
                return Err(corrupt(format!(
                    "{postal_code} is marked resolved without a coordinate"
                )));
            }
            (false, None, None) => None,
            (false, _, _) => {
                return Err(corrupt(format!(
                    "{postal_code} is marked unresolved but has a coordinate"
                )));
            }
        };

        Ok(CacheEntry {
            postal_code,
            coordinate,
            source: self.source.filter(|s| !s.is_empty()),
            resolved_at: self.resolved_at,
        })
    }
}

/// Reads a cache CSV.
///
/// # Errors
///
/// Returns [`CacheError::Corrupt`] for undecodable rows, invalid postal
/// codes, inconsistent resolved flags, and duplicate postal codes, and
/// [`CacheError::Io`] if the file cannot be opened.
pub fn read_csv(path: &Path) -> Result<Vec<CacheEntry>, CacheError> {
    let file = File::open(path).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);

    let mut entries: Vec<CacheEntry> = Vec::new();
    let mut seen = std::collections::BTreeSet::new();

    for (i, row) in reader.deserialize::<CacheRow>().enumerate() {
        // Header is line 1.
        let line = i as u64 + 2;
        let row = row.map_err(|e| CacheError::Corrupt {
            path: path.to_path_buf(),
            line,
            message: e.to_string(),
        })?;
        let entry = row.into_entry(path, line)?;

        if !seen.insert(entry.postal_code.clone()) {
            return Err(CacheError::Corrupt {
                path: path.to_path_buf(),
                line,
                message: format!("duplicate postal code {}", entry.postal_code),
            });
        }
        entries.push(entry);
    }

    Ok(entries)
}

/// Atomically replaces `path` with `entries`.
///
/// # Errors
///
/// Returns [`CacheError`] if the temporary file cannot be written, synced,
/// or renamed into place.
pub fn write_csv_atomic(path: &Path, entries: &[CacheEntry]) -> Result<(), CacheError> {
    let io_err = |source: std::io::Error| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let tmp = temp_path(path);
    let file = File::create(&tmp).map_err(io_err)?;
    let mut writer = csv::Writer::from_writer(file);
    for entry in entries {
        writer.serialize(CacheRow::from(entry))?;
    }
    writer.flush().map_err(io_err)?;

    let mut file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
    file.flush().map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Reads the legacy JSON cache format.
///
/// The format maps a postal code to `{"lat": .., "lon": .., "source": ..}`
/// or `null` for a failed lookup. Address sub-cache keys (`addr_*`) are
/// skipped, as are keys that are not valid postal codes. City-wide
/// placeholder coordinates are imported as unresolved.
///
/// # Errors
///
/// Returns [`CacheError::Corrupt`] if the document is not a JSON object,
/// and [`CacheError::Io`] / [`CacheError::Json`] on read and parse
/// failures.
pub fn read_legacy_json(path: &Path) -> Result<Vec<CacheEntry>, CacheError> {
    let text = fs::read_to_string(path).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: serde_json::Value = serde_json::from_str(&text)?;

    let Some(map) = doc.as_object() else {
        return Err(CacheError::Corrupt {
            path: path.to_path_buf(),
            line: 1,
            message: "legacy cache is not a JSON object".to_string(),
        });
    };

    let mut entries = Vec::with_capacity(map.len());
    for (key, value) in map {
        if key.starts_with(LEGACY_ADDRESS_KEY_PREFIX) {
            continue;
        }
        let postal_code = match PostalCode::parse(key) {
            Ok(code) => code,
            Err(e) => {
                log::warn!("Skipping legacy cache key {key:?}: {e}");
                continue;
            }
        };

        let source = value["source"].as_str().map(String::from);
        let placeholder = source
            .as_deref()
            .is_some_and(|s| LEGACY_PLACEHOLDER_SOURCES.contains(&s));

        let coordinate = match (value["lat"].as_f64(), value["lon"].as_f64()) {
            (Some(lat), Some(lon)) if !placeholder => {
                Some(Coordinate::new(lat, lon)).filter(Coordinate::is_valid)
            }
            _ => None,
        };

        entries.push(CacheEntry {
            postal_code,
            coordinate,
            source: coordinate.and(source),
            resolved_at: None,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str, coordinate: Option<(f64, f64)>) -> CacheEntry {
        CacheEntry {
            postal_code: PostalCode::parse(code).unwrap(),
            coordinate: coordinate.map(|(lat, lon)| Coordinate::new(lat, lon)),
            source: coordinate.map(|_| "viacep+nominatim".to_string()),
            resolved_at: Some(
                DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ),
        }
    }

    #[test]
    fn csv_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.csv");
        let entries = vec![
            entry("64000040", Some((-5.089_217_3, -42.801_934_1))),
            entry("64099999", None),
        ];

        write_csv_atomic(&path, &entries).unwrap();
        let loaded = read_csv(&path).unwrap();
        assert_eq!(loaded, entries);

        let first = fs::read(&path).unwrap();
        write_csv_atomic(&path, &loaded).unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
    }

    #[test]
    fn temp_file_is_not_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.csv");
        write_csv_atomic(&path, &[entry("64000040", Some((-5.0, -42.8)))]).unwrap();
        assert!(path.exists());
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn resolved_row_without_coordinate_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.csv");
        fs::write(
            &path,
            "postal_code,latitude,longitude,resolved,source,resolved_at\n\
             64000040,,,true,viacep+nominatim,\n",
        )
        .unwrap();
        assert!(matches!(
            read_csv(&path),
            Err(CacheError::Corrupt { line: 2, .. })
        ));
    }

    #[test]
    fn duplicate_rows_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.csv");
        fs::write(
            &path,
            "postal_code,latitude,longitude,resolved,source,resolved_at\n\
             64000040,-5.0,-42.8,true,,\n\
             64000-040,-5.0,-42.8,true,,\n",
        )
        .unwrap();
        assert!(matches!(
            read_csv(&path),
            Err(CacheError::Corrupt { line: 3, .. })
        ));
    }

    #[test]
    fn garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.csv");
        fs::write(
            &path,
            "postal_code,latitude,longitude,resolved,source,resolved_at\n\
             64000040,north,-42.8,maybe,,\n",
        )
        .unwrap();
        assert!(matches!(read_csv(&path), Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn imports_legacy_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cep_coordinates_cache.json");
        fs::write(
            &path,
            r#"{
                "64000040": {"lat": -5.0892, "lon": -42.8019, "source": "viacep+nominatim"},
                "64099999": null,
                "64088888": {"lat": -5.0892, "lon": -42.8019, "source": "fallback_geral"},
                "addr_123456": {"lat": -5.1, "lon": -42.7},
                "abc": null
            }"#,
        )
        .unwrap();

        let mut entries = read_legacy_json(&path).unwrap();
        entries.sort_by(|a, b| a.postal_code.cmp(&b.postal_code));
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].postal_code.as_str(), "64000040");
        assert_eq!(
            entries[0].coordinate,
            Some(Coordinate::new(-5.0892, -42.8019))
        );
        assert_eq!(entries[0].source.as_deref(), Some("viacep+nominatim"));

        assert_eq!(entries[1].postal_code.as_str(), "64088888");
        assert!(!entries[1].is_resolved());
        assert!(entries[1].source.is_none());

        assert_eq!(entries[2].postal_code.as_str(), "64099999");
        assert!(!entries[2].is_resolved());
    }
}
