#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Postal code geocoding.
//!
//! Converts Brazilian postal codes (CEP) to WGS84 coordinates using a
//! multi-provider strategy configured via TOML files in `services/`:
//!
//! 1. **ViaCEP + Nominatim** (priority 1): ViaCEP turns the postal code
//!    into a street address, which Nominatim then geocodes.
//! 2. **Nominatim fallback** (priority 2): free-form query with the city,
//!    state and postal code.
//! 3. **Prefix centroid** (priority 3, disabled by default): approximate
//!    area centroid from the postal code prefix.
//!
//! Providers are loaded from the [`service_registry`] and chained in
//! priority order by [`ProviderChain`]. Callers only see the
//! [`PostalGeocoder`] trait, so the coordinate cache can be tested with a
//! mock and never touches the network.

pub mod chain;
pub mod http;
pub mod nominatim;
pub mod prefix;
pub mod service_registry;
pub mod viacep;

use async_trait::async_trait;
use employment_map_employment_models::PostalCode;
use employment_map_geography_models::Coordinate;
use thiserror::Error;

pub use chain::ProviderChain;

/// A geocoding result for one postal code.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedPostalCode {
    /// Resolved coordinate (WGS84).
    pub coordinate: Coordinate,
    /// Tag of the provider that produced the coordinate (e.g.
    /// `"viacep+nominatim"`).
    pub source: String,
    /// The matched/canonical address returned by the provider.
    pub matched_address: Option<String>,
}

/// An external source of postal code coordinates.
///
/// `Ok(None)` means the provider answered and does not know the code; an
/// `Err` means the provider could not answer (network, rate limit,
/// malformed response) and the lookup may succeed if repeated.
#[async_trait]
pub trait PostalGeocoder: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> &str;

    /// Looks up a single postal code.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the provider could not produce an answer.
    async fn geocode(&self, code: &PostalCode) -> Result<Option<GeocodedPostalCode>, GeocodeError>;
}

/// Settings shared by every provider built from the registry.
#[derive(Debug, Clone)]
pub struct GeocoderSettings {
    /// City used in free-form queries (e.g. `"Teresina"`).
    pub city: String,
    /// Two-letter state (UF) abbreviation (e.g. `"PI"`).
    pub state: String,
    /// `User-Agent` header sent to Nominatim, as required by its usage
    /// policy.
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            city: "Teresina".to_string(),
            state: "PI".to_string(),
            user_agent: "employment-map/0.1".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("HTTP status {status} from {url}")]
    Status {
        /// Status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The service registry could not be turned into providers.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}
