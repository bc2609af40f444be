//! Country lookup with store-first caching.
//!
//! Countries are fetched from the metadata provider at most once per code and
//! never refreshed afterwards.

use std::sync::Arc;

use log::{debug, info};

use crate::backends::{CountryMetadata, CountryMetadataProvider};
use crate::error::{ProviderError, ResolveError, StoreError};
use crate::metadata_store::MetadataStore;
use crate::model::{normalize_country_code, Country};

pub struct CountryResolver {
    store: Arc<MetadataStore>,
    provider: Arc<dyn CountryMetadataProvider>,
}

impl CountryResolver {
    pub fn new(store: Arc<MetadataStore>, provider: Arc<dyn CountryMetadataProvider>) -> Self {
        Self { store, provider }
    }

    /// Returns the stored country for `code`, fetching and persisting it on a miss.
    pub fn resolve(&self, code: &str) -> Result<Country, ResolveError> {
        let country_code = normalize_country_code(code);
        if let Some(country) = self.store.find_country_by_code(&country_code)? {
            return Ok(country);
        }

        let metadata = self
            .provider
            .fetch_country(&country_code)
            .map_err(|err| match err {
                ProviderError::MissingFirstElement => ResolveError::ParseError {
                    code: country_code.clone(),
                    reason: err.to_string(),
                },
                other => ResolveError::NotFound {
                    code: country_code.clone(),
                    reason: other.to_string(),
                },
            })?;
        let country = country_from_metadata(&country_code, metadata);

        match self.store.create_country(&country) {
            Ok(created) => {
                info!("Country {} cached ({})", created.country_code, created.country_name);
                Ok(created)
            }
            // Another request created the same code between our read and write.
            Err(StoreError::DuplicateKey(_)) => {
                debug!("Country {} created concurrently, reading stored row", country_code);
                self.store
                    .find_country_by_code(&country_code)?
                    .ok_or_else(|| {
                        ResolveError::Store(StoreError::Corrupt(format!(
                            "country '{country_code}' reported duplicate but is missing"
                        )))
                    })
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Maps a provider payload into a country record, defaulting every absent field.
pub fn country_from_metadata(country_code: &str, metadata: CountryMetadata) -> Country {
    let (google_maps_url, open_street_map_url) = metadata
        .maps
        .map(|maps| {
            (
                maps.google_maps.unwrap_or_default(),
                maps.open_street_maps.unwrap_or_default(),
            )
        })
        .unwrap_or_default();
    let latlng = metadata
        .capital_info
        .and_then(|info| info.latlng)
        .unwrap_or_default();
    let flags = metadata.flags.unwrap_or_default();
    let coat_of_arms = metadata.coat_of_arms.unwrap_or_default();

    Country {
        country_code: country_code.to_string(),
        country_name: metadata
            .name
            .and_then(|name| name.common)
            .unwrap_or_default(),
        region: metadata.region.unwrap_or_default(),
        independent: metadata.independent.unwrap_or(false),
        google_maps_url,
        open_street_map_url,
        capital_name: metadata
            .capital
            .and_then(|capitals| capitals.into_iter().next())
            .unwrap_or_default(),
        capital_latitude: latlng.first().copied(),
        capital_longitude: latlng.get(1).copied(),
        flag_png: flags.png.unwrap_or_default(),
        flag_svg: flags.svg.unwrap_or_default(),
        flag_alt: flags.alt.unwrap_or_default(),
        coat_of_arms_png: coat_of_arms.png.unwrap_or_default(),
        coat_of_arms_svg: coat_of_arms.svg.unwrap_or_default(),
        borders_with: metadata.borders.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::{country_from_metadata, CountryResolver};
    use crate::backends::{
        CapitalInfo, CountryMaps, CountryMetadata, CountryMetadataProvider, CountryNames,
        ImageLinks,
    };
    use crate::error::{ProviderError, ResolveError};
    use crate::metadata_store::MetadataStore;
    use crate::model::Country;

    enum Canned {
        Metadata(CountryMetadata),
        Fail(fn() -> ProviderError),
    }

    struct FakeMetadataProvider {
        responses: Mutex<HashMap<String, Canned>>,
        calls: AtomicUsize,
        // Simulates a concurrent request creating the country mid-fetch.
        racing_store: Option<Arc<MetadataStore>>,
    }

    impl FakeMetadataProvider {
        fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
                racing_store: None,
            }
        }

        fn with(self, code: &str, canned: Canned) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(code.to_string(), canned);
            self
        }
    }

    impl CountryMetadataProvider for FakeMetadataProvider {
        fn fetch_country(&self, country_code: &str) -> Result<CountryMetadata, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(store) = self.racing_store.as_ref() {
                let _ = store.create_country(&Country {
                    country_code: country_code.to_string(),
                    country_name: "Created elsewhere".to_string(),
                    ..Country::default()
                });
            }
            match self.responses.lock().unwrap().get(country_code) {
                Some(Canned::Metadata(metadata)) => Ok(metadata.clone()),
                Some(Canned::Fail(make_err)) => Err(make_err()),
                None => Err(ProviderError::Status(404)),
            }
        }
    }

    fn us_metadata() -> CountryMetadata {
        CountryMetadata {
            name: Some(CountryNames {
                common: Some("United States".to_string()),
            }),
            region: Some("Americas".to_string()),
            independent: Some(true),
            maps: Some(CountryMaps {
                google_maps: Some("url1".to_string()),
                open_street_maps: Some("url2".to_string()),
            }),
            capital: Some(vec!["Washington".to_string(), "Other".to_string()]),
            capital_info: Some(CapitalInfo {
                latlng: Some(vec![1.0, 2.0, 3.0]),
            }),
            flags: Some(ImageLinks {
                png: Some("flag_png".to_string()),
                svg: Some("flag_svg".to_string()),
                alt: Some("alt".to_string()),
            }),
            coat_of_arms: Some(ImageLinks {
                png: Some("coa_png".to_string()),
                svg: Some("coa_svg".to_string()),
                alt: None,
            }),
            borders: Some(vec!["CAN".to_string(), "MEX".to_string()]),
        }
    }

    #[test]
    fn test_country_from_metadata_maps_all_fields() {
        let country = country_from_metadata("US", us_metadata());
        assert_eq!(country.country_name, "United States");
        assert_eq!(country.region, "Americas");
        assert!(country.independent);
        assert_eq!(country.google_maps_url, "url1");
        assert_eq!(country.open_street_map_url, "url2");
        assert_eq!(country.capital_name, "Washington");
        assert_eq!(country.capital_latitude, Some(1.0));
        assert_eq!(country.capital_longitude, Some(2.0));
        assert_eq!(country.flag_alt, "alt");
        assert_eq!(country.coat_of_arms_svg, "coa_svg");
        assert_eq!(country.borders_with, vec!["CAN", "MEX"]);
    }

    #[test]
    fn test_country_from_metadata_defaults_missing_fields() {
        let metadata = CountryMetadata {
            capital: Some(Vec::new()),
            capital_info: Some(CapitalInfo {
                latlng: Some(vec![10.0]),
            }),
            ..CountryMetadata::default()
        };
        let country = country_from_metadata("AQ", metadata);
        assert_eq!(country.country_code, "AQ");
        assert_eq!(country.country_name, "");
        assert!(!country.independent);
        assert_eq!(country.capital_name, "");
        assert_eq!(country.capital_latitude, Some(10.0));
        assert_eq!(country.capital_longitude, None);
        assert!(country.borders_with.is_empty());
    }

    #[test]
    fn test_resolve_fetches_once_then_serves_from_store() {
        let store = Arc::new(MetadataStore::in_memory().expect("failed to create in-memory store"));
        let provider =
            Arc::new(FakeMetadataProvider::new().with("US", Canned::Metadata(us_metadata())));
        let resolver = CountryResolver::new(Arc::clone(&store), provider.clone());

        let first = resolver.resolve("US").unwrap();
        let second = resolver.resolve("us").unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(store.find_country_by_code("US").unwrap().is_some());
    }

    #[test]
    fn test_resolve_non_success_is_not_found() {
        let store = Arc::new(MetadataStore::in_memory().expect("failed to create in-memory store"));
        let provider = Arc::new(FakeMetadataProvider::new());
        let resolver = CountryResolver::new(Arc::clone(&store), provider);

        let err = resolver.resolve("ZZ").unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { ref code, .. } if code == "ZZ"));
        assert!(store.find_country_by_code("ZZ").unwrap().is_none());
    }

    #[test]
    fn test_resolve_malformed_payload_is_not_found_and_missing_element_is_parse_error() {
        let store = Arc::new(MetadataStore::in_memory().expect("failed to create in-memory store"));
        let provider = Arc::new(
            FakeMetadataProvider::new()
                .with(
                    "XX",
                    Canned::Fail(|| ProviderError::InvalidBody("not json".to_string())),
                )
                .with("YY", Canned::Fail(|| ProviderError::MissingFirstElement)),
        );
        let resolver = CountryResolver::new(store, provider);

        assert!(matches!(
            resolver.resolve("XX").unwrap_err(),
            ResolveError::NotFound { .. }
        ));
        assert!(matches!(
            resolver.resolve("YY").unwrap_err(),
            ResolveError::ParseError { .. }
        ));
    }

    #[test]
    fn test_resolve_tolerates_concurrent_creation() {
        let store = Arc::new(MetadataStore::in_memory().expect("failed to create in-memory store"));
        let mut provider = FakeMetadataProvider::new().with("US", Canned::Metadata(us_metadata()));
        provider.racing_store = Some(Arc::clone(&store));
        let resolver = CountryResolver::new(Arc::clone(&store), Arc::new(provider));

        let country = resolver.resolve("US").unwrap();
        assert_eq!(country.country_name, "Created elsewhere");
    }
}
