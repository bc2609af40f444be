//! Country metadata provider adapter for the REST Countries API.

use serde_json::Value;

use crate::backends::{http_get_body, CountryMetadata, CountryMetadataProvider, UpstreamLimiter};
use crate::error::ProviderError;

/// REST Countries adapter backed by `ureq`.
pub struct RestCountriesProvider {
    http_client: ureq::Agent,
    limiter: UpstreamLimiter,
    base_url: String,
}

impl RestCountriesProvider {
    pub fn new(http_client: ureq::Agent, limiter: UpstreamLimiter, base_url: &str) -> Self {
        Self {
            http_client,
            limiter,
            base_url: base_url.trim().to_string(),
        }
    }

    fn request_url(&self, country_code: &str) -> String {
        let base = if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        };
        format!("{base}{}", urlencoding::encode(country_code))
    }

    /// Decodes a 2xx body: a JSON array whose first element is an object.
    fn parse_first_country(body: &str) -> Result<CountryMetadata, ProviderError> {
        let parsed: Value = serde_json::from_str(body)
            .map_err(|err| ProviderError::InvalidBody(err.to_string()))?;
        let Value::Array(items) = parsed else {
            return Err(ProviderError::InvalidBody("expected a JSON array".to_string()));
        };
        let Some(first @ Value::Object(_)) = items.into_iter().next() else {
            return Err(ProviderError::MissingFirstElement);
        };
        serde_json::from_value(first).map_err(|err| ProviderError::InvalidBody(err.to_string()))
    }
}

impl CountryMetadataProvider for RestCountriesProvider {
    fn fetch_country(&self, country_code: &str) -> Result<CountryMetadata, ProviderError> {
        let url = self.request_url(country_code);
        let body = http_get_body(&self.http_client, &self.limiter, &url)?;
        Self::parse_first_country(&body)
    }
}
