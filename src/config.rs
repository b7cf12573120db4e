use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::services::library_sync::{FetchOptions, PAGE_SIZE};
use crate::spotify_rs::SPOTIFY_API_BASE_URL;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the Web API, e.g. `https://api.spotify.com/`
    pub api_base_url: String,
    /// Country code for page requests. Derived from the locale when unset.
    pub market: Option<String>,
    /// Where downloaded tracks live; used for the local-availability check.
    pub music_directory: String,
    pub page_size: u32,
    /// Unset means every page is requested at once.
    pub max_in_flight: Option<usize>,
    pub probe_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub otlp_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: SPOTIFY_API_BASE_URL.to_string(),
            market: None,
            music_directory: "~/Music".to_string(),
            page_size: PAGE_SIZE,
            max_in_flight: None,
            probe_timeout_secs: 10,
            request_timeout_secs: 10,
            otlp_endpoint: None,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err(format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .wrap_err(format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("library-sync").join("config.toml"))
    }

    /// Load the default config file, falling back to defaults when it does not exist.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write the default config to `path` unless a file is already there.
    pub fn write_default(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err(format!("Failed to create {}", parent.display()))?;
        }
        let contents =
            toml::to_string_pretty(&Self::default()).wrap_err("Failed to serialize config")?;
        std::fs::write(path, contents)
            .wrap_err(format!("Failed to write config file: {}", path.display()))?;
        Ok(true)
    }

    pub fn create_default() -> Result<PathBuf> {
        let path = Self::config_path().ok_or_else(|| eyre!("No config directory available"))?;
        if !Self::write_default(&path)? {
            tracing::info!("Config already exists at {}", path.display());
        }
        Ok(path)
    }

    /// Expand ~ to home directory
    fn expand_path(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn music_directory_path(&self) -> PathBuf {
        self.expand_path(&self.music_directory)
    }

    pub fn api_base_url(&self) -> Result<Url> {
        Url::parse(&self.api_base_url)
            .wrap_err(format!("Invalid api_base_url: {}", self.api_base_url))
    }

    /// Configured market, or the country of the current locale.
    pub fn market(&self) -> Option<String> {
        self.market
            .clone()
            .or_else(|| locale_from_env().and_then(|locale| market_from_locale(&locale)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            page_size: self.page_size.clamp(1, PAGE_SIZE),
            market: self.market(),
            max_in_flight: self.max_in_flight,
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            page_timeout: self.request_timeout(),
        }
    }
}

fn locale_from_env() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.is_empty())
}

/// Country part of a POSIX locale: `it_IT.UTF-8` -> `IT`, `en-US` -> `US`.
pub fn market_from_locale(locale: &str) -> Option<String> {
    let name = locale.split(['.', '@']).next()?;
    let country = name.split(['_', '-']).nth(1)?;
    if country.len() == 2 && country.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(country.to_ascii_uppercase())
    } else {
        None
    }
}
