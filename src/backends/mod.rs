//! Upstream provider abstractions and concrete HTTP implementations.

pub mod nationalize;
pub mod restcountries;

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;

use crate::config::UpstreamConfig;
use crate::error::ProviderError;

/// One country guess returned by the prediction provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryPrediction {
    pub country_code: String,
    pub probability: f64,
}

/// First element of a metadata provider response. Every field is optional;
/// defaults are applied when the payload is mapped into a stored country.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CountryMetadata {
    pub name: Option<CountryNames>,
    pub region: Option<String>,
    pub independent: Option<bool>,
    pub maps: Option<CountryMaps>,
    pub capital: Option<Vec<String>>,
    pub capital_info: Option<CapitalInfo>,
    pub flags: Option<ImageLinks>,
    pub coat_of_arms: Option<ImageLinks>,
    pub borders: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CountryNames {
    pub common: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CountryMaps {
    pub google_maps: Option<String>,
    pub open_street_maps: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CapitalInfo {
    pub latlng: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImageLinks {
    pub png: Option<String>,
    pub svg: Option<String>,
    pub alt: Option<String>,
}

/// Name → country-probability service.
pub trait PredictionProvider: Send + Sync {
    /// Returns predictions in upstream order. An empty list means the provider
    /// had nothing for this name (including non-success statuses); `Err` means
    /// the call itself failed.
    fn predict(&self, name: &str) -> Result<Vec<CountryPrediction>, ProviderError>;
}

/// Country code → metadata service.
pub trait CountryMetadataProvider: Send + Sync {
    fn fetch_country(&self, country_code: &str) -> Result<CountryMetadata, ProviderError>;
}

/// Builds the shared blocking HTTP agent used by both providers.
pub fn build_http_agent(config: &UpstreamConfig) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
        .timeout_read(Duration::from_millis(config.read_timeout_ms))
        .timeout_write(Duration::from_millis(config.read_timeout_ms))
        .user_agent(concat!("nameorigin/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Optional client-side quota for one upstream provider.
pub struct UpstreamLimiter {
    limiter: Option<DefaultDirectRateLimiter>,
    wait_limit: Duration,
}

impl UpstreamLimiter {
    /// `requests_per_minute == 0` disables limiting.
    pub fn new(requests_per_minute: u32, wait_limit: Duration) -> Self {
        let limiter = NonZeroU32::new(requests_per_minute)
            .map(|per_minute| RateLimiter::direct(Quota::per_minute(per_minute)));
        Self {
            limiter,
            wait_limit,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Waits up to the configured cap for a slot. Returns `false` when the
    /// quota stayed saturated.
    pub fn acquire(&self) -> bool {
        let Some(limiter) = self.limiter.as_ref() else {
            return true;
        };
        if limiter.check().is_ok() {
            return true;
        }

        let deadline = Instant::now() + self.wait_limit;
        while Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
            if limiter.check().is_ok() {
                return true;
            }
        }
        false
    }
}

/// Issues a GET and returns the body of a 2xx response.
pub(crate) fn http_get_body(
    agent: &ureq::Agent,
    limiter: &UpstreamLimiter,
    url: &str,
) -> Result<String, ProviderError> {
    if !limiter.acquire() {
        return Err(ProviderError::Transport(
            "local upstream rate limit saturated".to_string(),
        ));
    }
    let response = match agent.get(url).set("Accept", "application/json").call() {
        Ok(response) => response,
        Err(ureq::Error::Status(code, _)) => return Err(ProviderError::Status(code)),
        Err(ureq::Error::Transport(transport)) => {
            return Err(ProviderError::Transport(transport.to_string()))
        }
    };
    response
        .into_string()
        .map_err(|err| ProviderError::Transport(format!("failed to read response: {err}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::UpstreamLimiter;

    #[test]
    fn test_unlimited_limiter_always_acquires() {
        let limiter = UpstreamLimiter::unlimited();
        for _ in 0..100 {
            assert!(limiter.acquire());
        }
    }

    #[test]
    fn test_saturated_limiter_gives_up_after_wait_cap() {
        let limiter = UpstreamLimiter::new(1, Duration::from_millis(120));
        assert!(limiter.acquire());
        assert!(!limiter.acquire());
    }
}
