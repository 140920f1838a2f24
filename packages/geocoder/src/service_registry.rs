//! Compile-time registry of geocoding service configurations.
//!
//! Each geocoding provider is defined in a TOML file under `services/`.
//! The registry embeds these at compile time and exposes them via
//! [`all_services`] and [`enabled_services`]; [`build_chain`] turns the
//! selected services into a [`ProviderChain`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::nominatim::{NominatimClient, NominatimFallback};
use crate::prefix::PrefixCentroid;
use crate::viacep::ViaCepNominatim;
use crate::{GeocodeError, GeocoderSettings, PostalGeocoder, ProviderChain};

/// A geocoding service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"viacep_nominatim"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service is active in the geocoding pipeline.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Execution order; lower values run first.
    pub priority: u32,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// ViaCEP street lookup, geocoded through Nominatim.
    ViacepNominatim {
        /// ViaCEP base URL (e.g., `"https://viacep.com.br/ws"`).
        viacep_base_url: String,
        /// Nominatim search endpoint.
        nominatim_base_url: String,
        /// Minimum delay between Nominatim requests in milliseconds.
        rate_limit_ms: u64,
    },
    /// Nominatim free-form query with city, state and postal code.
    NominatimFallback {
        /// Nominatim search endpoint.
        base_url: String,
        /// Minimum delay between requests in milliseconds.
        rate_limit_ms: u64,
    },
    /// Built-in prefix centroid table.
    PrefixCentroid,
}

const fn default_true() -> bool {
    true
}

impl GeocodingService {
    /// Returns the provider's base URL regardless of variant.
    ///
    /// Returns an empty string for providers without a base URL (e.g.,
    /// `PrefixCentroid`).
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::ViacepNominatim {
                viacep_base_url, ..
            } => viacep_base_url,
            ProviderConfig::NominatimFallback { base_url, .. } => base_url,
            ProviderConfig::PrefixCentroid => "",
        }
    }
}

// ── Compile-time embedded TOML files ────────────────────────────────

const SERVICE_TOMLS: &[(&str, &str)] = &[
    (
        "viacep_nominatim",
        include_str!("../services/viacep_nominatim.toml"),
    ),
    (
        "nominatim_fallback",
        include_str!("../services/nominatim_fallback.toml"),
    ),
    (
        "prefix_centroid",
        include_str!("../services/prefix_centroid.toml"),
    ),
];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 3;

/// Returns all geocoding service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse geocoding service '{name}': {e}"))
        })
        .collect()
}

/// Returns the services to run, sorted by priority (ascending).
///
/// With `only = None` the services' own `enabled` flags decide. With an
/// explicit list, exactly those services run regardless of their flags.
///
/// # Errors
///
/// Returns [`GeocodeError::Config`] if `only` names an unknown service.
pub fn enabled_services(only: Option<&[String]>) -> Result<Vec<GeocodingService>, GeocodeError> {
    let all = all_services();

    let mut services: Vec<GeocodingService> = match only {
        None => all.into_iter().filter(|s| s.enabled).collect(),
        Some(ids) => {
            if let Some(unknown) = ids.iter().find(|id| !all.iter().any(|s| &s.id == *id)) {
                return Err(GeocodeError::Config {
                    message: format!("unknown geocoding service '{unknown}'"),
                });
            }
            all.into_iter().filter(|s| ids.contains(&s.id)).collect()
        }
    };

    services.sort_by_key(|s| s.priority);
    Ok(services)
}

/// Builds a provider chain from `services`.
///
/// Services that point at the same Nominatim endpoint share one client so
/// the rate limit holds across providers.
///
/// # Errors
///
/// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
pub fn build_chain(
    services: &[GeocodingService],
    settings: &GeocoderSettings,
) -> Result<ProviderChain, GeocodeError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()?;

    let mut nominatim_clients: BTreeMap<String, Arc<NominatimClient>> = BTreeMap::new();
    let mut nominatim_for = |base_url: &str, rate_limit_ms: u64| {
        Arc::clone(
            nominatim_clients
                .entry(base_url.to_string())
                .or_insert_with(|| {
                    Arc::new(NominatimClient::new(
                        client.clone(),
                        base_url,
                        &settings.user_agent,
                        rate_limit_ms,
                    ))
                }),
        )
    };

    let mut providers: Vec<Box<dyn PostalGeocoder>> = Vec::with_capacity(services.len());
    for svc in services {
        let provider: Box<dyn PostalGeocoder> = match &svc.provider {
            ProviderConfig::ViacepNominatim {
                viacep_base_url,
                nominatim_base_url,
                rate_limit_ms,
            } => Box::new(ViaCepNominatim::new(
                &svc.id,
                client.clone(),
                viacep_base_url,
                nominatim_for(nominatim_base_url, *rate_limit_ms),
            )),
            ProviderConfig::NominatimFallback {
                base_url,
                rate_limit_ms,
            } => Box::new(NominatimFallback::new(
                &svc.id,
                &settings.city,
                &settings.state,
                nominatim_for(base_url, *rate_limit_ms),
            )),
            ProviderConfig::PrefixCentroid => Box::new(PrefixCentroid::teresina(&svc.id)),
        };
        log::debug!("Geocoding provider {} (priority {})", svc.id, svc.priority);
        providers.push(provider);
    }

    Ok(ProviderChain::new(providers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn loads_all_services() {
        let services = all_services();
        assert_eq!(services.len(), EXPECTED_SERVICE_COUNT);
    }

    #[test]
    fn service_ids_are_unique() {
        let services = all_services();
        let mut seen = BTreeSet::new();
        for svc in &services {
            assert!(seen.insert(&svc.id), "Duplicate service ID: {}", svc.id);
        }
    }

    #[test]
    fn all_services_have_required_fields() {
        for svc in &all_services() {
            assert!(!svc.id.is_empty(), "Service has empty id");
            assert!(!svc.name.is_empty(), "Service {} has empty name", svc.id);
            if !matches!(svc.provider, ProviderConfig::PrefixCentroid) {
                assert!(
                    !svc.base_url().is_empty(),
                    "Service {} has empty base_url",
                    svc.id
                );
            }
        }
    }

    #[test]
    fn enabled_services_sorted_by_priority() {
        let services = enabled_services(None).unwrap();
        for window in services.windows(2) {
            assert!(
                window[0].priority <= window[1].priority,
                "Services not sorted by priority: {} ({}) > {} ({})",
                window[0].id,
                window[0].priority,
                window[1].id,
                window[1].priority
            );
        }
    }

    #[test]
    fn prefix_centroid_disabled_by_default() {
        let services = enabled_services(None).unwrap();
        assert!(services.iter().all(|s| s.id != "prefix_centroid"));
    }

    #[test]
    fn explicit_selection_overrides_enabled_flag() {
        let only = vec!["prefix_centroid".to_string()];
        let services = enabled_services(Some(&only)).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].id, "prefix_centroid");
    }

    #[test]
    fn unknown_selection_is_rejected() {
        let only = vec!["census".to_string()];
        assert!(matches!(
            enabled_services(Some(&only)),
            Err(GeocodeError::Config { .. })
        ));
    }

    #[test]
    fn builds_chain_in_priority_order() {
        let chain =
            build_chain(&enabled_services(None).unwrap(), &GeocoderSettings::default()).unwrap();
        assert_eq!(
            chain.provider_ids(),
            vec!["viacep_nominatim", "nominatim_fallback"]
        );
    }
}
