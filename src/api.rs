//! HTTP API handlers for meteorflux.
//!
//! All endpoints take the same query parameters as [`FluxRequest`]:
//!
//! - `shower` (required): IMO shower code, e.g. `PER`
//! - `begin`, `end` (required): any format accepted by
//!   [`parse_flexible_timestamp`](crate::time::parse_flexible_timestamp)
//! - `min_meteors`, `min_eca`, `min_interval`, `max_interval`, `mode`: binning options
//! - `stations`: optional station code
//! - `popindex`: population index used for ZHR
//!
//! Unknown parameters are rejected with `400 Bad Request`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tracing::{info, instrument, warn};

use crate::dataset::FluxDataset;
use crate::error::FluxError;
use crate::model::{CoveragePoint, FluxRequest, FluxResponse, StationSummary};
use crate::storage::Storage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
}

/// Build the router with every endpoint mounted.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/flux", get(get_flux))
        .route("/stations", get(get_stations))
        .route("/coverage", get(get_coverage))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Map a library error to a response status, logging it on the way.
fn error_status(shower: &str, error: &FluxError) -> StatusCode {
    if error.is_client_error() {
        warn!(shower = %shower, error = %error, "Rejected flux request");
        StatusCode::BAD_REQUEST
    } else {
        warn!(shower = %shower, error = %error, "Failed to compute flux");
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// GET /flux - Binned flux profile with solar longitude and ZHR.
///
/// # Response
///
/// ```json
/// {
///     "shower": "PER",
///     "begin": "2011-08-10T00:00:00Z",
///     "end": "2011-08-15T00:00:00Z",
///     "population_index": 2.2,
///     "bins": [
///         {
///             "time": "2011-08-12T23:41:07Z",
///             "solar_longitude": 139.727,
///             "teff_hours": 31.2,
///             "eca_thousands": 412.5,
///             "met": 211,
///             "flux": 512.7,
///             "flux_uncertainty": 35.3,
///             "zhr": 2155.0
///         }
///     ]
/// }
/// ```
#[instrument(skip(state))]
pub async fn get_flux(
    State(state): State<AppState>,
    Query(request): Query<FluxRequest>,
) -> Result<Json<FluxResponse>, StatusCode> {
    let shower = request.shower.clone();
    let dataset = FluxDataset::new(request, Arc::new(state.storage.clone()))
        .map_err(|e| error_status(&shower, &e))?;

    let bins = dataset
        .flux_table()
        .await
        .map_err(|e| error_status(&shower, &e))?;

    let request = dataset.request();
    info!(
        shower = %request.shower,
        mode = ?request.mode,
        bins = bins.len(),
        "Flux queried"
    );

    Ok(Json(FluxResponse {
        shower: request.shower.clone(),
        begin: request.begin,
        end: request.end,
        population_index: request.population_index,
        bins,
    }))
}

/// GET /stations - Per-station totals over the requested range.
#[instrument(skip(state))]
pub async fn get_stations(
    State(state): State<AppState>,
    Query(request): Query<FluxRequest>,
) -> Result<Json<Vec<StationSummary>>, StatusCode> {
    request
        .validate()
        .map_err(|e| error_status(&request.shower, &e))?;

    match state
        .storage
        .station_summary(&request.observation_query())
        .await
    {
        Ok(stations) => {
            info!(stations = stations.len(), "Station summary queried");
            Ok(Json(stations))
        }
        Err(e) => {
            warn!(error = %e, "Failed to summarise stations");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /coverage - Reporting stations and meteors per observation slot.
#[instrument(skip(state))]
pub async fn get_coverage(
    State(state): State<AppState>,
    Query(request): Query<FluxRequest>,
) -> Result<Json<Vec<CoveragePoint>>, StatusCode> {
    request
        .validate()
        .map_err(|e| error_status(&request.shower, &e))?;

    match state.storage.coverage(&request.observation_query()).await {
        Ok(points) => {
            info!(points = points.len(), "Coverage queried");
            Ok(Json(points))
        }
        Err(e) => {
            warn!(error = %e, "Failed to compute coverage");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn test_router() -> Router {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        router(AppState { storage })
    }

    async fn status_of(uri: &str) -> StatusCode {
        test_router()
            .await
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health() {
        assert_eq!(status_of("/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_flux_empty_database() {
        assert_eq!(
            status_of("/flux?shower=PER&begin=2011-08-10&end=2011-08-15").await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_flux_rejects_misspelt_option() {
        assert_eq!(
            status_of("/flux?shower=PER&begin=2011-08-10&end=2011-08-15&min_meteor=5").await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_flux_rejects_inconsistent_binning() {
        assert_eq!(
            status_of(
                "/flux?shower=PER&begin=2011-08-10&end=2011-08-15&min_interval=5&max_interval=2"
            )
            .await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_flux_rejects_fixed_width_beyond_range() {
        assert_eq!(
            status_of(
                "/flux?shower=PER&begin=2011-08-10&end=2011-08-15&mode=fixed&min_interval=3e9&max_interval=6e9"
            )
            .await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_stations_rejects_long_range() {
        assert_eq!(
            status_of("/stations?shower=PER&begin=2011-01-01&end=2011-12-31").await,
            StatusCode::BAD_REQUEST
        );
    }
}
