use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the city catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CityRecord {
    pub name: String,
    pub country_name: String,
    pub country_code: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One weather reading for one city, taken at fetch time.
///
/// Serialized with the field names the HTTP API has always exposed
/// (`weather`, `rainfall`, `lat`, `iso2`, `date`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub city: String,
    /// °C
    pub temperature: f64,
    /// %
    pub humidity: u8,
    #[serde(rename = "weather")]
    pub weather_description: String,
    /// mm over the last hour; 0 when the provider reports none.
    #[serde(rename = "rainfall", default)]
    pub rainfall_last_hour: f64,
    /// mm over the last hour; 0 when the provider reports none.
    #[serde(rename = "snowfall", default)]
    pub snowfall_last_hour: f64,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
    #[serde(rename = "country")]
    pub country_name: String,
    #[serde(rename = "iso2")]
    pub country_code: String,
    #[serde(rename = "date")]
    pub observed_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feels_like: Option<f64>,
    /// hPa
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    /// m/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_gust: Option<f64>,
    /// metres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<u32>,
    /// cloud cover, %
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clouds: Option<u8>,
}

impl WeatherObservation {
    /// Bare observation for `city` with no precipitation and no optional readings.
    pub fn new(
        city: &CityRecord,
        temperature: f64,
        humidity: u8,
        weather_description: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            city: city.name.clone(),
            temperature,
            humidity,
            weather_description: weather_description.into(),
            rainfall_last_hour: 0.0,
            snowfall_last_hour: 0.0,
            latitude: city.latitude,
            longitude: city.longitude,
            country_name: city.country_name.clone(),
            country_code: city.country_code.clone(),
            observed_at,
            feels_like: None,
            pressure: None,
            wind_speed: None,
            wind_deg: None,
            wind_gust: None,
            visibility: None,
            clouds: None,
        }
    }

    pub fn marker(&self) -> CityMarker {
        CityMarker { city: self.city.clone(), lat: self.latitude, lng: self.longitude }
    }
}

/// Map marker projection returned by the country listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityMarker {
    pub city: String,
    pub lat: f64,
    pub lng: f64,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Filter token as requested.
    pub filter: String,
    /// Catalog rows that matched the filter, before truncation.
    pub matched: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Observations now in the store.
    pub stored: usize,
}
