//! Request handlers.
//!
//! Lookups touch SQLite and blocking HTTP clients, so the work runs on the
//! blocking thread pool.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::model::{normalize_country_code, NameDetails, PopularName};

#[derive(Debug, Deserialize)]
pub struct NamesQuery {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PopularNamesQuery {
    pub country: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PopularNamesResponse {
    pub country: String,
    pub top_names: Vec<PopularName>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

fn required_param(value: Option<String>, param: &str) -> Result<String, ApiError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("Missing \"{param}\" parameter.")))
}

fn optional_limit(value: Option<String>) -> Result<Option<usize>, ApiError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            ApiError::bad_request(format!("Invalid \"limit\" parameter: '{raw}'."))
        }),
    }
}

async fn run_blocking<T, F>(request_id: Uuid, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|err| {
        error!("Request {} worker failed: {}", request_id, err);
        ApiError::internal()
    })?
}

/// `GET /names?name=<name>`
pub async fn get_names(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NamesQuery>,
) -> Result<Json<NameDetails>, ApiError> {
    let name = required_param(query.name, "name")?;
    let request_id = Uuid::new_v4();
    info!("Request {}: name lookup for '{}'", request_id, name);

    let engine = Arc::clone(&state.engine);
    let details = run_blocking(request_id, move || {
        engine
            .get_or_refresh(&name, Utc::now())
            .map_err(ApiError::from)
    })
    .await?;
    Ok(Json(details))
}

/// `GET /popular-names?country=<code>[&limit=<n>]`
pub async fn get_popular_names(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PopularNamesQuery>,
) -> Result<Json<PopularNamesResponse>, ApiError> {
    let country = normalize_country_code(&required_param(query.country, "country")?);
    let limit = optional_limit(query.limit)?
        .unwrap_or(state.popularity_limits.default_limit)
        .clamp(1, state.popularity_limits.max_limit.max(1));
    let request_id = Uuid::new_v4();
    info!(
        "Request {}: popular names for {} (limit {})",
        request_id, country, limit
    );

    let popularity = Arc::clone(&state.popularity);
    let lookup_country = country.clone();
    let top_names = run_blocking(request_id, move || {
        popularity
            .top_names(&lookup_country, limit)
            .map_err(ApiError::from)
    })
    .await?;
    Ok(Json(PopularNamesResponse { country, top_names }))
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
