//! Name lookup pipeline: freshness check, upstream prediction, country
//! fan-out and atomic replacement of a name's probability set.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::backends::{CountryPrediction, PredictionProvider};
use crate::country_resolver::CountryResolver;
use crate::error::{EnrichmentError, ResolveError};
use crate::metadata_store::MetadataStore;
use crate::model::{normalize_country_code, NameDetails, NameRecord};

/// Default freshness window of a cached name.
pub const DEFAULT_FRESHNESS_TTL_HOURS: i64 = 24;

pub struct NameEnrichmentEngine {
    store: Arc<MetadataStore>,
    predictions: Arc<dyn PredictionProvider>,
    resolver: CountryResolver,
    freshness_ttl: chrono::Duration,
}

impl NameEnrichmentEngine {
    pub fn new(
        store: Arc<MetadataStore>,
        predictions: Arc<dyn PredictionProvider>,
        resolver: CountryResolver,
    ) -> Self {
        Self {
            store,
            predictions,
            resolver,
            freshness_ttl: chrono::Duration::hours(DEFAULT_FRESHNESS_TTL_HOURS),
        }
    }

    pub fn with_freshness_ttl(mut self, freshness_ttl: chrono::Duration) -> Self {
        self.freshness_ttl = freshness_ttl;
        self
    }

    /// Returns the cached record for `name_query`, refreshing it from upstream
    /// when it is missing or older than the freshness window.
    pub fn get_or_refresh(
        &self,
        name_query: &str,
        now: DateTime<Utc>,
    ) -> Result<NameDetails, EnrichmentError> {
        let name_query = name_query.trim();
        if name_query.is_empty() {
            return Err(EnrichmentError::InvalidName);
        }

        let existing = self.store.find_name_by_case_insensitive(name_query)?;
        if let Some(existing) = existing.as_ref() {
            if existing.is_fresh(now, self.freshness_ttl) {
                debug!("Lookup[{}]: fresh cache hit", name_query);
                let record = self.store.increment_name_usage(existing, now)?;
                return self.details_for(record);
            }
            debug!("Lookup[{}]: cached record is stale, refreshing", name_query);
        }

        self.refresh(name_query, existing.is_some(), now)
    }

    // Nothing about the name is written until every country is resolved.
    // Two concurrent refreshes of the same name may both reach upstream and
    // both replace the probability set; the last one to commit wins.
    fn refresh(
        &self,
        name_query: &str,
        had_existing: bool,
        now: DateTime<Utc>,
    ) -> Result<NameDetails, EnrichmentError> {
        let predictions = self.predictions.predict(name_query).map_err(|err| {
            warn!("Lookup[{}]: prediction provider failed: {}", name_query, err);
            EnrichmentError::UpstreamUnavailable {
                name: name_query.to_string(),
                reason: err.to_string(),
            }
        })?;
        if predictions.is_empty() {
            info!("Lookup[{}]: no country predictions upstream", name_query);
            return Err(EnrichmentError::NoPrediction(name_query.to_string()));
        }

        let resolved = self.resolve_predictions(name_query, &predictions)?;
        if resolved.is_empty() {
            info!(
                "Lookup[{}]: none of {} predictions resolved to a country",
                name_query,
                predictions.len()
            );
            return Err(EnrichmentError::NoPrediction(name_query.to_string()));
        }

        let record = self.store.refresh_name(name_query, now, &resolved)?;
        info!(
            "Lookup[{}]: {} with {}/{} predictions resolved",
            name_query,
            if had_existing { "refreshed" } else { "created" },
            resolved.len(),
            predictions.len()
        );

        self.details_for(record)
    }

    /// Folds predictions into `(country_code, probability)` pairs, keeping
    /// upstream order. Unresolvable and repeated codes are dropped.
    fn resolve_predictions(
        &self,
        name_query: &str,
        predictions: &[CountryPrediction],
    ) -> Result<Vec<(String, f64)>, EnrichmentError> {
        let mut seen = HashSet::new();
        predictions
            .iter()
            .try_fold(Vec::new(), |mut resolved, prediction| {
                let country_code = normalize_country_code(&prediction.country_code);
                if !seen.insert(country_code.clone()) {
                    debug!(
                        "Lookup[{}]: dropping repeated prediction for {}",
                        name_query, country_code
                    );
                    return Ok(resolved);
                }
                match self.resolver.resolve(&country_code) {
                    Ok(country) => resolved.push((country.country_code, prediction.probability)),
                    Err(ResolveError::Store(err)) => return Err(EnrichmentError::Store(err)),
                    Err(err) => {
                        debug!("Lookup[{}]: dropping prediction: {}", name_query, err);
                    }
                }
                Ok(resolved)
            })
    }

    fn details_for(&self, record: NameRecord) -> Result<NameDetails, EnrichmentError> {
        let countries = self.store.probabilities_for_name(&record)?;
        Ok(NameDetails { record, countries })
    }
}
