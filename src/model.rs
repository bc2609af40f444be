//! Records owned by the metadata store and the joined views served to clients.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One cached personal name and its usage counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameRecord {
    #[serde(skip)]
    pub id: i64,
    /// Spelling of the first successful lookup.
    pub name: String,
    pub count_of_requests: u64,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl NameRecord {
    /// Returns `true` when the record was touched less than `ttl` before `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.last_accessed
            .is_some_and(|last_accessed| now.signed_duration_since(last_accessed) < ttl)
    }
}

/// Country metadata, created once per code and never refreshed.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Country {
    pub country_code: String,
    pub country_name: String,
    pub region: String,
    pub independent: bool,
    pub google_maps_url: String,
    pub open_street_map_url: String,
    pub capital_name: String,
    pub capital_latitude: Option<f64>,
    pub capital_longitude: Option<f64>,
    pub flag_png: String,
    pub flag_svg: String,
    pub flag_alt: String,
    pub coat_of_arms_png: String,
    pub coat_of_arms_svg: String,
    pub borders_with: Vec<String>,
}

/// Denormalized country row joined with one name's probability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryProbability {
    #[serde(flatten)]
    pub country: Country,
    pub probability: f64,
}

/// Full lookup result for `GET /names`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameDetails {
    #[serde(flatten)]
    pub record: NameRecord,
    pub countries: Vec<CountryProbability>,
}

/// One entry of a per-country popularity ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopularName {
    pub name: String,
    pub count_of_requests: u64,
}

/// Normalizes a country code for storage and lookup.
pub fn normalize_country_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Case-insensitive key under which a name is stored.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{name_key, normalize_country_code, NameRecord};

    fn record_accessed_at(last_accessed: Option<chrono::DateTime<Utc>>) -> NameRecord {
        NameRecord {
            id: 1,
            name: "John".to_string(),
            count_of_requests: 1,
            last_accessed,
        }
    }

    #[test]
    fn test_is_fresh_boundary_is_exclusive() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let ttl = Duration::hours(24);

        assert!(record_accessed_at(Some(now - ttl + Duration::seconds(1))).is_fresh(now, ttl));
        assert!(!record_accessed_at(Some(now - ttl)).is_fresh(now, ttl));
        assert!(!record_accessed_at(Some(now - ttl - Duration::seconds(1))).is_fresh(now, ttl));
    }

    #[test]
    fn test_is_fresh_false_without_last_accessed() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(!record_accessed_at(None).is_fresh(now, Duration::hours(24)));
    }

    #[test]
    fn test_name_key_folds_unicode_case() {
        assert_eq!(name_key("  ÉLODIE "), "élodie");
        assert_eq!(name_key("John"), name_key("JOHN"));
    }

    #[test]
    fn test_normalize_country_code_uppercases_and_trims() {
        assert_eq!(normalize_country_code(" us "), "US");
    }
}
