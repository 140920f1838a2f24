//! Run configuration.
//!
//! Read from a TOML file; every field has a default, so a missing file or
//! a partial one is fine. The file is looked up at the explicit path if
//! given, then at `$EMPLOYMENT_MAP_CONFIG`, then at
//! `employment_map.toml` in the working directory.

use std::path::{Path, PathBuf};

use employment_map_analytics::overplot::OverplotConfig;
use employment_map_boundaries::{BoundaryError, UtmProjection, projection::DEFAULT_ZONE};
use employment_map_cache::{CacheOptions, DEFAULT_CHECKPOINT_EVERY, RetryPolicy};
use employment_map_geocoder::GeocoderSettings;
use employment_map_geography_models::{BoundarySource, GeometryExtractor, Partition, SourceCrs};
use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "EMPLOYMENT_MAP_CONFIG";

/// Configuration file read when neither a path nor [`CONFIG_ENV`] is set.
pub const DEFAULT_CONFIG_FILE: &str = "employment_map.toml";

/// IBGE code of Teresina.
pub const TERESINA_MUNICIPALITY_ID: &str = "2211001";

/// Complete run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Employment input.
    pub input: InputConfig,
    /// Coordinate cache.
    pub cache: CacheConfig,
    /// Geocoding providers.
    pub geocoding: GeocodingConfig,
    /// Region boundary files.
    pub partitions: PartitionsConfig,
    /// Spatial join.
    pub spatial: SpatialConfig,
    /// Marker weighting and dot density.
    pub overplot: OverplotConfig,
    /// Output location.
    pub output: OutputConfig,
}

/// `[input]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Employment CSV.
    pub path: PathBuf,
    /// Only rows for this municipality are used.
    pub municipality_id: String,
    /// Only these years are used; all years when absent.
    pub years: Option<Vec<u16>>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/employment.csv"),
            municipality_id: TERESINA_MUNICIPALITY_ID.to_string(),
            years: None,
        }
    }
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache CSV.
    pub path: PathBuf,
    /// Persist after this many new entries; `0` disables checkpoints.
    pub checkpoint_every: usize,
    /// Retry policy for transient geocoder errors.
    pub retry: RetryPolicy,
    /// Maximum concurrent postal code resolutions.
    pub concurrency: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/postal_code_cache.csv"),
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            retry: RetryPolicy::default(),
            concurrency: 4,
        }
    }
}

impl CacheConfig {
    /// Options for opening the cache.
    #[must_use]
    pub const fn options(&self) -> CacheOptions {
        CacheOptions {
            retry: self.retry,
            checkpoint_every: self.checkpoint_every,
        }
    }
}

/// `[geocoding]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    /// City used in free-form queries.
    pub city: String,
    /// State (UF) abbreviation.
    pub state: String,
    /// `User-Agent` sent to Nominatim.
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Run exactly these services instead of the enabled ones.
    pub services: Option<Vec<String>>,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        let settings = GeocoderSettings::default();
        Self {
            city: settings.city,
            state: settings.state,
            user_agent: settings.user_agent,
            timeout_secs: settings.timeout_secs,
            services: None,
        }
    }
}

impl GeocodingConfig {
    /// Provider settings.
    #[must_use]
    pub fn settings(&self) -> GeocoderSettings {
        GeocoderSettings {
            city: self.city.clone(),
            state: self.state.clone(),
            user_agent: self.user_agent.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

/// `[partitions.*]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionsConfig {
    /// Neighborhood boundaries.
    pub neighborhood: BoundarySource,
    /// Administrative zone boundaries.
    pub zone: BoundarySource,
}

impl Default for PartitionsConfig {
    fn default() -> Self {
        Self {
            neighborhood: default_source("data/neighborhoods.geojson"),
            zone: default_source("data/zones.geojson"),
        }
    }
}

fn default_source(path: &str) -> BoundarySource {
    BoundarySource {
        path: PathBuf::from(path),
        name_field: None,
        crs: SourceCrs::default(),
        geometry: GeometryExtractor::default(),
    }
}

impl PartitionsConfig {
    /// Source for `partition`.
    #[must_use]
    pub const fn source(&self, partition: Partition) -> &BoundarySource {
        match partition {
            Partition::Neighborhood => &self.neighborhood,
            Partition::Zone => &self.zone,
        }
    }
}

/// `[spatial]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Nearest-boundary fallback tolerance in meters.
    pub tolerance_m: f64,
    /// UTM zone of the working CRS.
    pub utm_zone: u8,
    /// Southern hemisphere.
    pub south: bool,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            tolerance_m: 50.0,
            utm_zone: DEFAULT_ZONE,
            south: true,
        }
    }
}

impl SpatialConfig {
    /// Working CRS projection.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError::InvalidZone`] for a zone outside 1–60.
    pub fn projection(&self) -> Result<UtmProjection, BoundaryError> {
        UtmProjection::new(self.utm_zone, self.south)
    }
}

/// `[output]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory outputs are written to.
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

impl PipelineConfig {
    /// Loads the configuration.
    ///
    /// An explicit `path` must exist. Otherwise `$EMPLOYMENT_MAP_CONFIG`
    /// (which must exist if set) or [`DEFAULT_CONFIG_FILE`] (optional) is
    /// read, falling back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if a required file cannot be read and
    /// [`PipelineError::Config`] if it is not valid.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }

        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            log::debug!("No {DEFAULT_CONFIG_FILE}, using default configuration");
            Ok(Self::default())
        }
    }

    /// Reads and parses `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] or [`PipelineError::Config`].
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = toml::from_str(&text).map_err(|e| PipelineError::Config {
            path: path.to_path_buf(),
            source: e,
        })?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use employment_map_analytics::overplot::WeightScale;

    use super::*;

    #[test]
    fn empty_file_is_default() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.input.municipality_id, "2211001");
        assert_eq!(config.cache.checkpoint_every, 50);
        assert_eq!(config.cache.retry.max_attempts, 3);
        assert!((config.spatial.tolerance_m - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.spatial.utm_zone, 23);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [input]
            path = "rais.csv"
            years = [2021, 2023]

            [cache.retry]
            max_attempts = 5

            [partitions.zone]
            path = "zonas.json"
            name_field = "ZONA"
            crs = "planar"
            geometry = { type = "esri_rings" }

            [spatial]
            tolerance_m = 5.0

            [overplot]
            scale = "log"
            "#,
        )
        .unwrap();

        assert_eq!(config.input.path, PathBuf::from("rais.csv"));
        assert_eq!(config.input.municipality_id, "2211001");
        assert_eq!(config.input.years, Some(vec![2021, 2023]));
        assert_eq!(config.cache.retry.max_attempts, 5);
        assert_eq!(config.cache.retry.base_delay_ms, 500);
        assert_eq!(config.cache.concurrency, 4);

        let zone = config.partitions.source(Partition::Zone);
        assert_eq!(zone.crs, SourceCrs::Planar);
        assert_eq!(zone.geometry, GeometryExtractor::EsriRings);
        assert_eq!(
            config.partitions.source(Partition::Neighborhood).path,
            PathBuf::from("data/neighborhoods.geojson")
        );

        assert!((config.spatial.tolerance_m - 5.0).abs() < f64::EPSILON);
        assert!(config.spatial.south);
        assert_eq!(config.overplot.scale, WeightScale::Log);
    }

    #[test]
    fn reads_file_and_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[output]\ndir = \"out\"\n").unwrap();
        let config = PipelineConfig::load(Some(&good)).unwrap();
        assert_eq!(config.output.dir, PathBuf::from("out"));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[spatial]\ntolerance_m = \"far\"\n").unwrap();
        assert!(matches!(
            PipelineConfig::load(Some(&bad)),
            Err(PipelineError::Config { .. })
        ));

        assert!(matches!(
            PipelineConfig::load(Some(&dir.path().join("missing.toml"))),
            Err(PipelineError::Io { .. })
        ));
    }

    #[test]
    fn invalid_zone_is_rejected() {
        let spatial = SpatialConfig {
            utm_zone: 0,
            ..SpatialConfig::default()
        };
        assert!(spatial.projection().is_err());
        assert!(SpatialConfig::default().projection().is_ok());
    }
}
