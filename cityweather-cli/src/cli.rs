use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use cityweather_core::{
    AppState, Config, IngestReport, Ingestor, ObservationStore, QueryService, provider_from_config,
};
use tokio_util::sync::CancellationToken;

const COUNTRY_PROMPT: &str =
    "Enter country code (e.g., US) or full country name (e.g., United States) or \"ALL\" for all cities:";

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "cityweather", version, about = "City weather ingestion and lookup")]
pub struct Cli {
    /// City catalog CSV; overrides the configured path.
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// SQLite observation store; overrides the configured path.
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key in the config file.
    Configure,

    /// Fetch current weather for a country's cities and replace the stored snapshot.
    Scrape {
        /// Country code, country name or "ALL"; prompted for when omitted.
        country: Option<String>,

        /// Maximum number of cities to fetch.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Serve the HTTP API.
    Serve {
        /// Listen address, e.g. 127.0.0.1:5000.
        #[arg(long)]
        addr: Option<String>,
    },

    /// Show the stored observation for a city.
    Weather {
        /// Exact city name.
        city: String,
    },

    /// List stored cities (with coordinates) for a country.
    Cities {
        /// Country code or name.
        country: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut config = Config::load_with_env()?;
        if let Some(catalog) = self.catalog {
            config.catalog_path = catalog;
        }
        if let Some(database) = self.database {
            config.database_path = Some(database);
        }

        match self.command {
            Command::Configure => configure(config),
            Command::Scrape { country, limit } => scrape(&config, country, limit).await,
            Command::Serve { addr } => serve(&config, addr).await,
            Command::Weather { city } => show_weather(&config, &city).await,
            Command::Cities { country } => list_cities(&config, &country).await,
        }
    }
}

fn configure(mut config: Config) -> Result<()> {
    let api_key = inquire::Password::new("OpenWeather API key:")
        .without_confirmation()
        .with_help_message("Get one at https://home.openweathermap.org/api_keys")
        .prompt()
        .context("Failed to read API key")?;

    let api_key = api_key.trim().to_string();
    if api_key.is_empty() {
        anyhow::bail!("API key must not be empty");
    }

    config.set_api_key(api_key);
    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn scrape(config: &Config, country: Option<String>, limit: Option<usize>) -> Result<()> {
    let country = match country {
        Some(c) => c,
        None => inquire::Text::new(COUNTRY_PROMPT)
            .with_default("ALL")
            .prompt()
            .context("Failed to read country")?,
    };

    let store = open_store(config)?;
    let ingestor = build_ingestor(config, store.clone())?;
    let cancel = cancel_on_ctrl_c();

    println!("Fetching weather data for {country}...");
    let report = ingestor.ingest(&country, limit, &cancel).await;
    store.close()?;

    print_report(&report?);
    Ok(())
}

async fn serve(config: &Config, addr: Option<String>) -> Result<()> {
    let store = open_store(config)?;
    let ingestor = Arc::new(build_ingestor(config, store.clone())?);
    let addr = addr.unwrap_or_else(|| config.listen_addr.clone());

    let state = AppState::new(ingestor, cancel_on_ctrl_c());
    cityweather_core::serve(&addr, state).await?;

    store.close()?;
    Ok(())
}

async fn show_weather(config: &Config, city: &str) -> Result<()> {
    let query = QueryService::new(open_store(config)?);

    match query.get_by_city(city).await? {
        Some(obs) => {
            println!("{} ({}, {})", obs.city, obs.country_name, obs.country_code);
            let local = obs.observed_at.with_timezone(&Local);
            println!("  observed:    {}", local.format("%Y-%m-%d %H:%M %:z"));
            println!("  conditions:  {}", obs.weather_description);
            println!("  temperature: {:.1} °C", obs.temperature);
            println!("  humidity:    {} %", obs.humidity);
            println!("  rain (1h):   {:.1} mm", obs.rainfall_last_hour);
            println!("  snow (1h):   {:.1} mm", obs.snowfall_last_hour);
            if let Some(speed) = obs.wind_speed {
                println!("  wind:        {speed:.1} m/s");
            }
        }
        None => println!("Weather data not found for {city}"),
    }
    Ok(())
}

async fn list_cities(config: &Config, country: &str) -> Result<()> {
    let query = QueryService::new(open_store(config)?);

    let markers = query.get_by_country(country).await?;
    if markers.is_empty() {
        println!("No cities found for {country}");
    }
    for m in markers {
        println!("{:<30} {:>9.4} {:>10.4}", m.city, m.lat, m.lng);
    }
    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<ObservationStore>> {
    let path = config.resolved_database_path()?;
    Ok(Arc::new(ObservationStore::open(path)))
}

fn build_ingestor(config: &Config, store: Arc<ObservationStore>) -> Result<Ingestor> {
    let provider = provider_from_config(config)?;
    Ok(Ingestor::new(&config.catalog_path, provider, store).with_default_limit(config.default_limit))
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            trigger.cancel();
        }
    });
    token
}

fn print_report(report: &IngestReport) {
    println!(
        "Weather data scraping and insertion completed for {}: {} matched, {} fetched, {} failed, {} stored.",
        report.filter, report.matched, report.succeeded, report.failed, report.stored
    );
}
