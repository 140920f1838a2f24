//! ViaCEP postal code lookup.
//!
//! ViaCEP maps a CEP to a street address but returns no coordinates. The
//! [`ViaCepNominatim`] provider composes the address
//! (`street, district, city, UF`) and geocodes it through Nominatim.
//!
//! Unknown codes come back as HTTP 200 with `{"erro": true}`.
//!
//! See <https://viacep.com.br/>

use std::sync::Arc;

use async_trait::async_trait;
use employment_map_employment_models::PostalCode;
use serde::Deserialize;

use crate::nominatim::NominatimClient;
use crate::{GeocodeError, GeocodedPostalCode, PostalGeocoder};

/// Source tag recorded for coordinates produced by this provider.
pub const SOURCE_TAG: &str = "viacep+nominatim";

/// The address fields ViaCEP returns for a known postal code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ViaCepAddress {
    /// Street name.
    #[serde(default)]
    pub logradouro: String,
    /// District / neighborhood.
    #[serde(default)]
    pub bairro: String,
    /// City.
    #[serde(default)]
    pub localidade: String,
    /// State abbreviation.
    #[serde(default)]
    pub uf: String,
}

impl ViaCepAddress {
    /// Joins the non-empty parts into a one-line address.
    #[must_use]
    pub fn one_line(&self) -> String {
        [
            self.logradouro.as_str(),
            self.bairro.as_str(),
            self.localidade.as_str(),
            self.uf.as_str(),
        ]
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Parses a ViaCEP response body.
///
/// Returns `Ok(None)` for the `erro` marker and for generic (city-wide)
/// postal codes without a street, which Nominatim cannot place.
///
/// # Errors
///
/// Returns [`GeocodeError::Parse`] if the body is not a ViaCEP object.
pub fn parse_response(body: &serde_json::Value) -> Result<Option<ViaCepAddress>, GeocodeError> {
    if !body.is_object() {
        return Err(GeocodeError::Parse {
            message: "ViaCEP response is not an object".to_string(),
        });
    }

    // `erro` is `true` on current deployments and `"true"` on older ones.
    if body.get("erro").is_some_and(|e| e.as_bool() == Some(true) || e.as_str() == Some("true")) {
        return Ok(None);
    }

    let address: ViaCepAddress =
        serde_json::from_value(body.clone()).map_err(|e| GeocodeError::Parse {
            message: format!("Unexpected ViaCEP payload: {e}"),
        })?;

    if address.logradouro.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(address))
}

/// ViaCEP street lookup followed by Nominatim geocoding.
pub struct ViaCepNominatim {
    id: String,
    client: reqwest::Client,
    base_url: String,
    nominatim: Arc<NominatimClient>,
}

impl ViaCepNominatim {
    /// Creates the provider.
    #[must_use]
    pub fn new(
        id: &str,
        client: reqwest::Client,
        base_url: &str,
        nominatim: Arc<NominatimClient>,
    ) -> Self {
        Self {
            id: id.to_string(),
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            nominatim,
        }
    }

    /// Looks the postal code up on ViaCEP.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request or parsing fails.
    pub async fn lookup(&self, code: &PostalCode) -> Result<Option<ViaCepAddress>, GeocodeError> {
        let url = format!("{}/{}/json/", self.base_url, code.as_str());
        let body = crate::http::get_json(self.client.get(&url)).await?;
        parse_response(&body)
    }
}

#[async_trait]
impl PostalGeocoder for ViaCepNominatim {
    fn id(&self) -> &str {
        &self.id
    }

    async fn geocode(&self, code: &PostalCode) -> Result<Option<GeocodedPostalCode>, GeocodeError> {
        let Some(address) = self.lookup(code).await? else {
            log::debug!("ViaCEP has no street for {code}");
            return Ok(None);
        };

        let query = address.one_line();
        let Some(hit) = self.nominatim.search(&query).await? else {
            log::debug!("Nominatim could not place {query:?} ({code})");
            return Ok(None);
        };

        Ok(Some(GeocodedPostalCode {
            coordinate: hit.coordinate,
            source: SOURCE_TAG.to_string(),
            matched_address: hit.display_name.or(Some(query)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_code() {
        let body = serde_json::json!({
            "cep": "64000-040",
            "logradouro": "Rua Areolino de Abreu",
            "complemento": "",
            "bairro": "Centro",
            "localidade": "Teresina",
            "uf": "PI",
            "ibge": "2211001"
        });
        let address = parse_response(&body).unwrap().unwrap();
        assert_eq!(
            address.one_line(),
            "Rua Areolino de Abreu, Centro, Teresina, PI"
        );
    }

    #[test]
    fn erro_marker_is_not_found() {
        assert!(
            parse_response(&serde_json::json!({"erro": true}))
                .unwrap()
                .is_none()
        );
        assert!(
            parse_response(&serde_json::json!({"erro": "true"}))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn city_wide_code_without_street_is_not_found() {
        let body = serde_json::json!({
            "cep": "64000-000",
            "logradouro": "",
            "bairro": "",
            "localidade": "Teresina",
            "uf": "PI"
        });
        assert!(parse_response(&body).unwrap().is_none());
    }

    #[test]
    fn one_line_skips_empty_parts() {
        let address = ViaCepAddress {
            logradouro: "Avenida Frei Serafim".to_string(),
            bairro: String::new(),
            localidade: "Teresina".to_string(),
            uf: "PI".to_string(),
        };
        assert_eq!(address.one_line(), "Avenida Frei Serafim, Teresina, PI");
    }

    #[test]
    fn rejects_array_body() {
        assert!(parse_response(&serde_json::json!([])).is_err());
    }
}
