use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub cache_db_path: String,
    pub display_currency: String,
    /// Domestic catalog override; the bundled list is used when unset
    pub catalog_path: Option<String>,
    pub csv_logging: bool,
    pub csv_log_path: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            cache_db_path: "forecaster_cache.db".to_string(),
            display_currency: "JPY".to_string(),
            catalog_path: None,
            csv_logging: false,
            csv_log_path: "logs/searches.csv".to_string(),
        }
    }
}

/// TTLs are in minutes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub key_prefix: String,
    pub quote_ttl_minutes: u64,
    pub history_ttl_minutes: u64,
    pub news_ttl_minutes: u64,
    pub fx_ttl_minutes: u64,
    pub crypto_id_ttl_minutes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "forecaster:".to_string(),
            quote_ttl_minutes: 5,
            history_ttl_minutes: 30,
            news_ttl_minutes: 15,
            fx_ttl_minutes: 30,
            crypto_id_ttl_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub yahoo_base_url: String,
    pub coingecko_base_url: String,
    pub news_base_url: String,
    pub fx_base_url: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub news_page_size: u32,
    pub history_range: String,
    pub history_interval: String,
    pub request_timeout_secs: Option<u64>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            yahoo_base_url: "https://query1.finance.yahoo.com".to_string(),
            coingecko_base_url: "https://api.coingecko.com/api/v3".to_string(),
            news_base_url: "https://newsapi.org/v2".to_string(),
            fx_base_url: "https://api.exchangerate-api.com/v4".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_model: "gemini-pro".to_string(),
            news_page_size: 10,
            history_range: "1y".to_string(),
            history_interval: "1d".to_string(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub gemini_api_key: Option<String>,
    pub news_api_key: Option<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl EnvConfig {
    /// Read secrets from the environment (and `.env`). Missing keys select the fallbacks.
    pub fn load() -> Self {
        dotenv::dotenv().ok();

        Self {
            gemini_api_key: non_empty_var("GEMINI_API_KEY"),
            news_api_key: non_empty_var("NEWS_API_KEY"),
        }
    }
}
