use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{ingest::DEFAULT_LIMIT, provider::openweather::DEFAULT_ENDPOINT};

pub const ENV_API_KEY: &str = "WEATHER_API_KEY";
pub const ENV_DATABASE: &str = "CITYWEATHER_DATABASE";
pub const ENV_CATALOG: &str = "CITYWEATHER_CATALOG";

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// catalog_path = "assets/worldcities.csv"
/// default_limit = 100
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OpenWeather API key.
    pub api_key: Option<String>,

    /// Current-weather endpoint; only overridden for testing or proxies.
    pub endpoint: String,

    pub catalog_path: PathBuf,

    /// SQLite file; `None` means the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Cities fetched per ingestion run when the caller gives no limit.
    pub default_limit: usize,

    pub listen_addr: String,

    /// Outbound request timeout; unset keeps the HTTP client's default.
    pub request_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            catalog_path: PathBuf::from("assets/worldcities.csv"),
            database_path: None,
            default_limit: DEFAULT_LIMIT,
            listen_addr: "127.0.0.1:5000".to_string(),
            request_timeout_secs: None,
        }
    }
}

impl Config {
    /// Read the config from the platform config dir. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err).with_context(|| format!("Cannot read {}", path.display())),
        };

        toml::from_str(&contents).with_context(|| format!("Invalid TOML in {}", path.display()))
    }

    /// Load from disk, then apply process environment overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut cfg = Self::load()?;
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Override fields from environment-style lookups; empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(db) = get(ENV_DATABASE) {
            self.database_path = Some(PathBuf::from(db));
        }
        if let Some(catalog) = get(ENV_CATALOG) {
            self.catalog_path = PathBuf::from(catalog);
        }
    }

    /// Write the config to the platform config dir.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = dir {
            fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
        }

        let body = toml::to_string_pretty(self).context("Cannot encode config as TOML")?;
        fs::write(path, body).with_context(|| format!("Cannot write {}", path.display()))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Configured database path, falling back to the platform data directory.
    pub fn resolved_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("observations.db")),
        }
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.api_key = Some(api_key);
    }

    pub fn is_api_key_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "cityweather", "cityweather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }
}
