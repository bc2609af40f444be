//! Error types for each layer of the lookup pipeline.

use thiserror::Error;

/// Failures raised by [`crate::metadata_store::MetadataStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same unique key already exists.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A stored row could not be decoded back into a record.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Failures raised while resolving a country code.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The metadata provider answered with a non-success status, an unusable
    /// body, or could not be reached.
    #[error("country '{code}' not found: {reason}")]
    NotFound { code: String, reason: String },
    /// The metadata provider answered without a usable first element.
    #[error("country '{code}' payload could not be parsed: {reason}")]
    ParseError { code: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures raised by [`crate::name_enrichment_engine::NameEnrichmentEngine`].
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("name query is blank")]
    InvalidName,
    #[error("No country predictions for name '{0}'.")]
    NoPrediction(String),
    #[error("Country prediction service unavailable for name '{name}'.")]
    UpstreamUnavailable { name: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures raised by [`crate::popularity::PopularityAggregator`].
#[derive(Debug, Error)]
pub enum PopularityError {
    #[error("Country '{0}' not found.")]
    NotFound(String),
    #[error("No names available for country '{0}'.")]
    Empty(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures raised by upstream provider adapters before any payload is decoded.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request never produced an HTTP response (connect, timeout, TLS,
    /// local rate limit).
    #[error("upstream request failed: {0}")]
    Transport(String),
    /// The provider answered with a non-success status code.
    #[error("upstream returned status {0}")]
    Status(u16),
    /// The provider answered 2xx with a body that is not the expected JSON.
    #[error("upstream returned an invalid body: {0}")]
    InvalidBody(String),
    /// The provider answered with a JSON array that has no usable first element.
    #[error("upstream payload has no usable first element")]
    MissingFirstElement,
}
