//! HTTP API surface.
//!
//! ## Routes
//!
//! - `GET /names?name=<name>` - cached or refreshed country predictions for a name
//! - `GET /popular-names?country=<code>[&limit=<n>]` - most requested names for a country
//! - `GET /health` - liveness probe, no authentication

pub mod auth;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;

use crate::api::auth::TokenValidator;
use crate::config::PopularityConfig;
use crate::name_enrichment_engine::NameEnrichmentEngine;
use crate::popularity::PopularityAggregator;

/// Shared handler state.
pub struct AppState {
    pub engine: Arc<NameEnrichmentEngine>,
    pub popularity: Arc<PopularityAggregator>,
    pub tokens: Arc<dyn TokenValidator>,
    pub popularity_limits: PopularityConfig,
}

/// Builds the full router with authentication applied to every data route.
pub fn router(state: Arc<AppState>) -> Router {
    let authenticated = Router::new()
        .route("/names", get(routes::get_names))
        .route("/names/", get(routes::get_names))
        .route("/popular-names", get(routes::get_popular_names))
        .route("/popular-names/", get(routes::get_popular_names))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .merge(authenticated)
        .with_state(state)
}
