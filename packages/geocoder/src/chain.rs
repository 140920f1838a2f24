//! Priority-ordered provider chain.

use async_trait::async_trait;
use employment_map_employment_models::PostalCode;

use crate::{GeocodeError, GeocodedPostalCode, PostalGeocoder};

/// Tries each provider in order; the first hit wins.
///
/// A provider error does not stop the chain. If no provider produced a hit
/// and at least one failed, the first error is returned so the caller can
/// retry; if every provider answered "not found", the result is `Ok(None)`.
pub struct ProviderChain {
    providers: Vec<Box<dyn PostalGeocoder>>,
}

impl ProviderChain {
    /// Creates a chain from providers already sorted by priority.
    #[must_use]
    pub fn new(providers: Vec<Box<dyn PostalGeocoder>>) -> Self {
        Self { providers }
    }

    /// Number of providers in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if the chain has no providers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider identifiers in execution order.
    #[must_use]
    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }
}

#[async_trait]
impl PostalGeocoder for ProviderChain {
    fn id(&self) -> &str {
        "chain"
    }

    async fn geocode(&self, code: &PostalCode) -> Result<Option<GeocodedPostalCode>, GeocodeError> {
        let mut first_error: Option<GeocodeError> = None;

        for provider in &self.providers {
            match provider.geocode(code).await {
                Ok(Some(hit)) => {
                    log::debug!(
                        "{code}: {:.5}, {:.5} via {}",
                        hit.coordinate.latitude,
                        hit.coordinate.longitude,
                        provider.id()
                    );
                    return Ok(Some(hit));
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("{code}: provider {} failed: {e}", provider.id());
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(None), Err)
    }
}
