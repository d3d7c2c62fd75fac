//! Read-only lookups over the current observation snapshot.

use std::sync::Arc;

use crate::{
    error::Result,
    model::{CityMarker, WeatherObservation},
    store::{Criteria, ObservationStore},
};

#[derive(Clone)]
pub struct QueryService {
    store: Arc<ObservationStore>,
}

impl QueryService {
    pub fn new(store: Arc<ObservationStore>) -> Self {
        Self { store }
    }

    /// Latest observation for `name` (exact, case-sensitive), or `None`.
    pub async fn get_by_city(&self, name: &str) -> Result<Option<WeatherObservation>> {
        let store = self.store.clone();
        let criteria = Criteria::City(name.to_string());
        tokio::task::spawn_blocking(move || store.find_one(&criteria)).await?
    }

    /// Map markers for every stored city in the country; empty when none match.
    pub async fn get_by_country(&self, token: &str) -> Result<Vec<CityMarker>> {
        let store = self.store.clone();
        let criteria = Criteria::Country(token.trim().to_string());
        let found = tokio::task::spawn_blocking(move || store.find_many(&criteria)).await??;
        Ok(found.iter().map(WeatherObservation::marker).collect())
    }
}
