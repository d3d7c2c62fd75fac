//! Core library for the `cityweather` service.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The city catalog and country selection
//! - The OpenWeather provider and per-city fetching
//! - The SQLite observation store and read-side queries
//! - Ingestion runs and the HTTP API over them
//!
//! It is used by `cityweather-cli`, but can also be embedded in other binaries.

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod model;
pub mod provider;
pub mod query;
pub mod store;

pub use api::{AppState, router, serve};
pub use catalog::Catalog;
pub use config::Config;
pub use error::{Error, Result};
pub use filter::CountryFilter;
pub use ingest::{DEFAULT_LIMIT, Ingestor};
pub use model::{CityMarker, CityRecord, IngestReport, WeatherObservation};
pub use provider::{WeatherProvider, fetch_observation, provider_from_config};
pub use query::QueryService;
pub use store::{Criteria, ObservationStore};
