//! Per-country ranking of the most requested names.

use std::sync::Arc;

use crate::error::PopularityError;
use crate::metadata_store::MetadataStore;
use crate::model::{normalize_country_code, PopularName};

pub const DEFAULT_TOP_NAMES_LIMIT: usize = 5;

/// Read-only view over stored request counts.
pub struct PopularityAggregator {
    store: Arc<MetadataStore>,
}

impl PopularityAggregator {
    pub fn new(store: Arc<MetadataStore>) -> Self {
        Self { store }
    }

    /// Returns up to `limit` names linked to `country_code`, most requested first.
    pub fn top_names(
        &self,
        country_code: &str,
        limit: usize,
    ) -> Result<Vec<PopularName>, PopularityError> {
        let country_code = normalize_country_code(country_code);
        if self.store.find_country_by_code(&country_code)?.is_none() {
            return Err(PopularityError::NotFound(country_code));
        }

        let names = self
            .store
            .top_names_for_country(&country_code, limit.max(1))?;
        if names.is_empty() {
            return Err(PopularityError::Empty(country_code));
        }
        Ok(names)
    }
}
