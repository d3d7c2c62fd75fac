use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::model::{CityRecord, WeatherObservation};

use super::WeatherProvider;

pub const DEFAULT_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    endpoint: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_endpoint(api_key, DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(api_key: String, endpoint: &str) -> Self {
        Self {
            api_key,
            endpoint: endpoint.to_string(),
            http: Client::new(),
        }
    }

    /// Replace the transport's default timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build OpenWeather HTTP client")?;
        Ok(self)
    }

    async fn fetch_current(&self, city: &CityRecord) -> Result<WeatherObservation> {
        let lat = city.latitude.to_string();
        let lon = city.longitude.to_string();

        let res = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            .context("Failed to send request to OpenWeather (current weather)")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read OpenWeather current response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "OpenWeather current request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let parsed: OwCurrentResponse =
            serde_json::from_str(&body).context("Failed to parse OpenWeather current JSON")?;

        Ok(parsed.into_observation(city))
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: u8,
    feels_like: Option<f64>,
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: Option<f64>,
    deg: Option<f64>,
    gust: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwClouds {
    all: Option<u8>,
}

/// `rain` / `snow` blocks; only the last-hour volume is used.
#[derive(Debug, Deserialize)]
struct OwPrecipitation {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
    wind: Option<OwWind>,
    visibility: Option<u32>,
    clouds: Option<OwClouds>,
    rain: Option<OwPrecipitation>,
    snow: Option<OwPrecipitation>,
}

impl OwCurrentResponse {
    fn into_observation(self, city: &CityRecord) -> WeatherObservation {
        let condition = self
            .weather
            .first()
            .map(|w| w.description.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let mut obs =
            WeatherObservation::new(city, self.main.temp, self.main.humidity, condition, Utc::now());

        // No rain/snow block means nothing fell, not that it is unknown.
        obs.rainfall_last_hour = self.rain.and_then(|r| r.one_hour).unwrap_or(0.0);
        obs.snowfall_last_hour = self.snow.and_then(|s| s.one_hour).unwrap_or(0.0);

        obs.feels_like = self.main.feels_like;
        obs.pressure = self.main.pressure;
        if let Some(wind) = self.wind {
            obs.wind_speed = wind.speed;
            obs.wind_deg = wind.deg;
            obs.wind_gust = wind.gust;
        }
        obs.visibility = self.visibility;
        obs.clouds = self.clouds.and_then(|c| c.all);
        obs
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current_weather(&self, city: &CityRecord) -> Result<WeatherObservation> {
        self.fetch_current(city).await
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let cut = (0..=MAX).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}
