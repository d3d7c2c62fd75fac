//! HTTP routes over the ingestion pipeline and the observation store.
//!
//! - `GET /scrape/{country}[?limit=N]` runs an ingestion and returns its report
//! - `GET /weather?city=<name>` returns the stored observation for a city
//! - `GET /cities/{country}` returns map markers for a country's stored cities

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{ingest::Ingestor, query::QueryService};

#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub query: QueryService,
    /// Cancelled on server shutdown; in-flight ingestion runs are bound to it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(ingestor: Arc<Ingestor>, shutdown: CancellationToken) -> Self {
        let query = QueryService::new(ingestor.store().clone());
        Self { ingestor, query, shutdown }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scrape/{country}", get(handle_scrape))
        .route("/weather", get(handle_weather))
        .route("/cities/{country}", get(handle_cities))
        .with_state(state)
}

/// Bind `addr` and serve until `state.shutdown` is cancelled.
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;
    tracing::info!("Server is running on http://{}", listener.local_addr()?);

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server terminated with an error")?;

    tracing::info!("Server stopped");
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ScrapeQuery {
    pub limit: Option<usize>,
}

/// GET /scrape/{country}
///
/// The run is spawned so that a client hanging up does not abort it half
/// way; only server shutdown cancels it.
async fn handle_scrape(
    State(state): State<AppState>,
    Path(country): Path<String>,
    Query(params): Query<ScrapeQuery>,
) -> Response {
    let ingestor = state.ingestor.clone();
    let cancel = state.shutdown.child_token();
    let run = tokio::spawn(async move { ingestor.ingest(&country, params.limit, &cancel).await });

    match run.await {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(e)) => {
            tracing::error!("Ingestion failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error scraping weather data").into_response()
        }
        Err(e) => {
            tracing::error!("Ingestion task aborted: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error scraping weather data").into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub city: Option<String>,
}

/// GET /weather?city=<name>
async fn handle_weather(State(state): State<AppState>, Query(params): Query<WeatherQuery>) -> Response {
    let city = match params.city {
        Some(c) if !c.trim().is_empty() => c,
        _ => return (StatusCode::BAD_REQUEST, "City parameter is required").into_response(),
    };

    match state.query.get_by_city(&city).await {
        Ok(Some(observation)) => (StatusCode::OK, Json(observation)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Weather data not found for this city").into_response(),
        Err(e) => {
            tracing::error!("Weather lookup for {city} failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error fetching weather data").into_response()
        }
    }
}

/// GET /cities/{country}
async fn handle_cities(State(state): State<AppState>, Path(country): Path<String>) -> Response {
    match state.query.get_by_country(&country).await {
        Ok(markers) if markers.is_empty() => {
            (StatusCode::NOT_FOUND, "No cities found for this country").into_response()
        }
        Ok(markers) => (StatusCode::OK, Json(markers)).into_response(),
        Err(e) => {
            tracing::error!("City listing for {country} failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error fetching cities").into_response()
        }
    }
}
