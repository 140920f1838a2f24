//! Nominatim / `OpenStreetMap` geocoder client.
//!
//! Nominatim has strict rate limits: **1 request per second** maximum on
//! the public instance. [`NominatimClient`] enforces the configured minimum
//! delay between requests itself, so it can be shared between providers
//! and concurrent resolutions.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use employment_map_employment_models::PostalCode;
use employment_map_geography_models::Coordinate;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{GeocodeError, GeocodedPostalCode, PostalGeocoder};

/// Source tag recorded for coordinates produced by [`NominatimFallback`].
pub const FALLBACK_SOURCE_TAG: &str = "nominatim_fallback";

/// A rate-limited Nominatim search client.
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

/// A Nominatim hit.
#[derive(Debug, Clone, PartialEq)]
pub struct NominatimHit {
    /// Coordinate of the first result.
    pub coordinate: Coordinate,
    /// `display_name` of the first result.
    pub display_name: Option<String>,
}

impl NominatimClient {
    /// Creates a client for `base_url` that waits at least `rate_limit_ms`
    /// between requests.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        user_agent: &str,
        rate_limit_ms: u64,
    ) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            user_agent: user_agent.to_string(),
            min_interval: Duration::from_millis(rate_limit_ms),
            last_request: Mutex::new(None),
        }
    }

    /// Returns the search endpoint this client queries.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Geocodes a free-form query restricted to Brazil.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the HTTP request or response parsing fails.
    pub async fn search(&self, query: &str) -> Result<Option<NominatimHit>, GeocodeError> {
        self.wait_turn().await;

        let request = self
            .client
            .get(&self.base_url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[
                ("q", query),
                ("countrycodes", "br"),
                ("format", "json"),
                ("limit", "1"),
            ]);

        let body = crate::http::get_json(request).await?;
        parse_response(&body)
    }

    /// Sleeps until the minimum interval since the previous request has
    /// elapsed, then claims the next slot.
    async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// City-level free-form query: `"{city}, {state}, Brasil, CEP {code}"`.
///
/// Used when ViaCEP has no street for the code. The result is usually the
/// centroid of whatever Nominatim associates with the postal code.
pub struct NominatimFallback {
    id: String,
    city: String,
    state: String,
    nominatim: Arc<NominatimClient>,
}

impl NominatimFallback {
    /// Creates the provider.
    #[must_use]
    pub fn new(id: &str, city: &str, state: &str, nominatim: Arc<NominatimClient>) -> Self {
        Self {
            id: id.to_string(),
            city: city.to_string(),
            state: state.to_string(),
            nominatim,
        }
    }

    /// Builds the free-form query for `code`.
    #[must_use]
    pub fn query(&self, code: &PostalCode) -> String {
        format!("{}, {}, Brasil, CEP {code}", self.city, self.state)
    }
}

#[async_trait]
impl PostalGeocoder for NominatimFallback {
    fn id(&self) -> &str {
        &self.id
    }

    async fn geocode(&self, code: &PostalCode) -> Result<Option<GeocodedPostalCode>, GeocodeError> {
        let Some(hit) = self.nominatim.search(&self.query(code)).await? else {
            return Ok(None);
        };

        Ok(Some(GeocodedPostalCode {
            coordinate: hit.coordinate,
            source: FALLBACK_SOURCE_TAG.to_string(),
            matched_address: hit.display_name,
        }))
    }
}

/// Parses a Nominatim JSON array response.
pub(crate) fn parse_response(body: &serde_json::Value) -> Result<Option<NominatimHit>, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let lat = parse_number(&first["lat"]).ok_or_else(|| GeocodeError::Parse {
        message: "Missing lat in Nominatim response".to_string(),
    })?;

    let lon = parse_number(&first["lon"]).ok_or_else(|| GeocodeError::Parse {
        message: "Missing lon in Nominatim response".to_string(),
    })?;

    let coordinate = Coordinate::new(lat, lon);
    if !coordinate.is_valid() {
        return Err(GeocodeError::Parse {
            message: format!("Nominatim returned out-of-range coordinate {lat}, {lon}"),
        });
    }

    Ok(Some(NominatimHit {
        coordinate,
        display_name: first["display_name"].as_str().map(String::from),
    }))
}

/// Nominatim encodes coordinates as strings; accept plain numbers too.
fn parse_number(value: &serde_json::Value) -> Option<f64> {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value.as_f64())
}
