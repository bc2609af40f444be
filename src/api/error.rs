//! API error type and HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde::Serialize;

use crate::error::{EnrichmentError, PopularityError, StoreError};

const INTERNAL_DETAIL: &str = "Internal server error.";

/// JSON error body returned for every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// HTTP error with a client-safe detail message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_DETAIL)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn from_store(err: &StoreError) -> Self {
        error!("Storage failure while serving request: {}", err);
        Self::internal()
    }
}

impl From<EnrichmentError> for ApiError {
    fn from(err: EnrichmentError) -> Self {
        match err {
            EnrichmentError::InvalidName => Self::bad_request("Missing \"name\" parameter."),
            EnrichmentError::NoPrediction(_) | EnrichmentError::UpstreamUnavailable { .. } => {
                Self::not_found(err.to_string())
            }
            EnrichmentError::Store(ref store_err) => Self::from_store(store_err),
        }
    }
}

impl From<PopularityError> for ApiError {
    fn from(err: PopularityError) -> Self {
        match err {
            PopularityError::NotFound(_) | PopularityError::Empty(_) => {
                Self::not_found(err.to_string())
            }
            PopularityError::Store(ref store_err) => Self::from_store(store_err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::ApiError;
    use crate::error::{EnrichmentError, PopularityError, StoreError};

    #[test]
    fn test_enrichment_errors_map_to_not_found_with_name() {
        let err = ApiError::from(EnrichmentError::NoPrediction("Zzzznone".to_string()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.detail(), "No country predictions for name 'Zzzznone'.");

        let err = ApiError::from(EnrichmentError::UpstreamUnavailable {
            name: "John".to_string(),
            reason: "timed out".to_string(),
        });
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert!(err.detail().contains("John"));
        assert!(!err.detail().contains("timed out"));
    }

    #[test]
    fn test_store_errors_hide_internal_detail() {
        let err = ApiError::from(PopularityError::Store(StoreError::Corrupt(
            "borders_with garbage".to_string(),
        )));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.detail().contains("borders_with"));
    }

    #[test]
    fn test_popularity_errors_map_to_not_found() {
        let err = ApiError::from(PopularityError::NotFound("ZZ".to_string()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.detail(), "Country 'ZZ' not found.");
    }
}
