use crate::{
    Config,
    error::{Error, Result},
    model::{CityRecord, WeatherObservation},
    provider::openweather::OpenWeatherProvider,
};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

pub mod openweather;

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Current conditions at the city's coordinates.
    async fn current_weather(&self, city: &CityRecord) -> anyhow::Result<WeatherObservation>;
}

/// Construct the OpenWeather provider from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let api_key = config.api_key.as_deref().filter(|k| !k.is_empty()).ok_or_else(|| {
        anyhow::anyhow!(
            "No OpenWeather API key configured.\n\
             Hint: run `cityweather configure` or set WEATHER_API_KEY."
        )
    })?;

    let mut provider = OpenWeatherProvider::with_endpoint(api_key.to_owned(), &config.endpoint);
    if let Some(secs) = config.request_timeout_secs {
        provider = provider.with_timeout(Duration::from_secs(secs))?;
    }

    Ok(Arc::new(provider))
}

/// Fetch one city's observation, absorbing provider failures.
///
/// A failed fetch is logged and reported as `Ok(None)` so the caller can skip
/// the city. Only cancellation of `cancel` is returned as an error.
pub async fn fetch_observation(
    provider: &dyn WeatherProvider,
    city: &CityRecord,
    cancel: &CancellationToken,
) -> Result<Option<WeatherObservation>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = provider.current_weather(city) => match res {
            Ok(observation) => Ok(Some(observation)),
            Err(e) => {
                let err = Error::FetchFailed { city: city.name.clone(), reason: format!("{e:#}") };
                tracing::warn!("{err}");
                Ok(None)
            }
        },
    }
}
