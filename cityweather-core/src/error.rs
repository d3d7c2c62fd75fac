use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the ingestion pipeline and the observation store.
///
/// A query miss is not represented here: lookups return `Option`/empty `Vec`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("City catalog unavailable at {}: {reason}", .path.display())]
    CatalogUnavailable { path: PathBuf, reason: String },

    /// Per-city and non-fatal; the orchestrator logs it and moves on.
    #[error("Weather fetch failed for {city}: {reason}")]
    FetchFailed { city: String, reason: String },

    #[error("Observation store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Ingestion run cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn catalog(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::CatalogUnavailable { path: path.into(), reason: reason.to_string() }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::StoreUnavailable(format!("background task failed: {err}"))
    }
}
