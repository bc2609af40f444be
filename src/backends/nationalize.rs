//! Prediction provider adapter for the nationalize.io API.

use log::debug;
use serde::Deserialize;

use crate::backends::{http_get_body, CountryPrediction, PredictionProvider, UpstreamLimiter};
use crate::error::ProviderError;

#[derive(Debug, Default, Deserialize)]
struct NationalizeResponse {
    #[serde(default)]
    country: Option<Vec<NationalizeEntry>>,
}

#[derive(Debug, Default, Deserialize)]
struct NationalizeEntry {
    #[serde(default)]
    country_id: Option<String>,
    #[serde(default)]
    probability: Option<f64>,
}

/// Nationalize adapter backed by `ureq`.
pub struct NationalizeProvider {
    http_client: ureq::Agent,
    limiter: UpstreamLimiter,
    base_url: String,
}

impl NationalizeProvider {
    pub fn new(http_client: ureq::Agent, limiter: UpstreamLimiter, base_url: &str) -> Self {
        Self {
            http_client,
            limiter,
            base_url: base_url.trim().to_string(),
        }
    }

    fn request_url(&self, name: &str) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}name={}",
            self.base_url,
            urlencoding::encode(name)
        )
    }

    /// Decodes a 2xx body. A missing `country` key yields no predictions;
    /// entries without a code or with an out-of-range probability are dropped.
    fn parse_predictions(body: &str) -> Result<Vec<CountryPrediction>, ProviderError> {
        let parsed: NationalizeResponse = serde_json::from_str(body)
            .map_err(|err| ProviderError::InvalidBody(err.to_string()))?;
        let predictions = parsed
            .country
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| {
                let country_code = entry
                    .country_id
                    .map(|code| code.trim().to_string())
                    .filter(|code| !code.is_empty())?;
                let probability = entry
                    .probability
                    .filter(|value| value.is_finite() && (0.0..=1.0).contains(value));
                let Some(probability) = probability else {
                    debug!(
                        "Nationalize: dropping {} prediction with unusable probability",
                        country_code
                    );
                    return None;
                };
                Some(CountryPrediction {
                    country_code,
                    probability,
                })
            })
            .collect();
        Ok(predictions)
    }
}

impl PredictionProvider for NationalizeProvider {
    fn predict(&self, name: &str) -> Result<Vec<CountryPrediction>, ProviderError> {
        let url = self.request_url(name);
        let body = match http_get_body(&self.http_client, &self.limiter, &url) {
            Ok(body) => body,
            Err(ProviderError::Status(status)) => {
                debug!("Nationalize: status {} for '{}', treating as no predictions", status, name);
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        match Self::parse_predictions(&body) {
            Ok(predictions) => Ok(predictions),
            Err(err) => {
                debug!("Nationalize: unusable body for '{}': {}", name, err);
                Ok(Vec::new())
            }
        }
    }
}
