//! Ingestion runs: catalog → country filter → per-city fetch → snapshot replace.

use std::{fs::File, io, path::PathBuf, sync::Arc};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    catalog::Catalog,
    error::{Error, Result},
    filter::{CountryFilter, filter_by_country},
    model::{CityRecord, IngestReport},
    provider::{WeatherProvider, fetch_observation},
    store::ObservationStore,
};

/// Cities fetched per run when the caller gives no limit.
pub const DEFAULT_LIMIT: usize = 100;

/// Opens a fresh reader over the catalog for each run.
type CatalogOpener = dyn Fn() -> io::Result<Box<dyn io::Read + Send>> + Send + Sync;

/// Drives ingestion runs against one catalog, provider and store.
///
/// Runs are serialized: a second `ingest` call waits until the one in flight
/// has written its snapshot, so two runs never interleave their writes.
pub struct Ingestor {
    catalog_path: PathBuf,
    open_catalog: Arc<CatalogOpener>,
    provider: Arc<dyn WeatherProvider>,
    store: Arc<ObservationStore>,
    default_limit: usize,
    run_lock: Mutex<()>,
}

impl Ingestor {
    pub fn new(
        catalog_path: impl Into<PathBuf>,
        provider: Arc<dyn WeatherProvider>,
        store: Arc<ObservationStore>,
    ) -> Self {
        let catalog_path: PathBuf = catalog_path.into();
        let file_path = catalog_path.clone();
        let open_catalog: Arc<CatalogOpener> = Arc::new(move || {
            let file = File::open(&file_path)?;
            Ok(Box::new(file) as Box<dyn io::Read + Send>)
        });

        Self {
            catalog_path,
            open_catalog,
            provider,
            store,
            default_limit: DEFAULT_LIMIT,
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn store(&self) -> &Arc<ObservationStore> {
        &self.store
    }

    /// Read the catalog through `opener` instead of opening the path directly.
    ///
    /// The path given to [`Ingestor::new`] is still used to name the catalog
    /// in errors and logs.
    pub fn with_catalog_opener<F>(mut self, opener: F) -> Self
    where
        F: Fn() -> io::Result<Box<dyn io::Read + Send>> + Send + Sync + 'static,
    {
        self.open_catalog = Arc::new(opener);
        self
    }

    /// Whether a run currently holds the ingestion lock.
    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Run one ingestion for `token` (country name, ISO-2 code or `ALL`).
    ///
    /// At most `limit` (default [`DEFAULT_LIMIT`]) matching cities are fetched,
    /// taken from the head of the catalog in file order. Cities whose fetch
    /// fails are skipped. The store is then replaced with whatever was fetched,
    /// which may be nothing.
    ///
    /// # Errors
    /// `CatalogUnavailable` and `StoreUnavailable` abort the run, as does
    /// cancelling `cancel` before the store is written. In every error case
    /// the previous snapshot is left as it was.
    pub async fn ingest(
        &self,
        token: &str,
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let _run = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.run_lock.lock() => guard,
        };

        let filter = CountryFilter::parse(token);
        let limit = limit.unwrap_or(self.default_limit);

        let matched = self.load_cities(&filter).await?;
        tracing::info!("Found {} cities for country filter: {}", matched.len(), filter);
        if matched.is_empty() {
            tracing::info!("No cities found for country code or name: {}", filter);
        }

        let mut report =
            IngestReport { filter: filter.to_string(), matched: matched.len(), ..Default::default() };

        let mut batch = Vec::with_capacity(limit.min(matched.len()));
        for city in matched.iter().take(limit) {
            report.attempted += 1;
            tracing::debug!("Fetching weather for {}...", city.name);

            match fetch_observation(self.provider.as_ref(), city, cancel).await? {
                Some(observation) => {
                    report.succeeded += 1;
                    batch.push(observation);
                }
                None => report.failed += 1,
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let store = self.store.clone();
        report.stored = tokio::task::spawn_blocking(move || store.replace_all(&batch)).await??;

        if report.stored == 0 {
            tracing::info!("No weather records to insert; store cleared.");
        } else {
            tracing::info!("{} weather records inserted.", report.stored);
        }
        if report.failed > 0 {
            tracing::warn!("{} of {} cities could not be fetched", report.failed, report.attempted);
        }

        Ok(report)
    }

    /// Matching catalog rows, or `CatalogUnavailable` if the catalog could not
    /// be read to the end. A partial read never reaches the store.
    async fn load_cities(&self, filter: &CountryFilter) -> Result<Vec<CityRecord>> {
        let path = self.catalog_path.clone();
        let open = self.open_catalog.clone();
        let filter = filter.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<CityRecord>> {
            let reader = open().map_err(|e| Error::catalog(&path, e))?;
            let mut catalog = Catalog::with_source(reader, &path)?;
            let cities: Vec<CityRecord> = filter_by_country(catalog.by_ref(), &filter).collect();

            match catalog.take_error() {
                Some(err) => Err(err),
                None => Ok(cities),
            }
        })
        .await
        .map_err(|e| Error::catalog(&self.catalog_path, e))?
    }
}
