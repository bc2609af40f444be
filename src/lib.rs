//! Name → country-of-origin lookup service with a local SQLite cache.

pub mod api;
pub mod backends;
pub mod config;
pub mod country_resolver;
pub mod error;
pub mod metadata_store;
pub mod model;
pub mod name_enrichment_engine;
pub mod popularity;
