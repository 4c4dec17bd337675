mod ai;
mod analysis;
mod config;
mod dashboard;
mod data;
mod error;
mod monitoring;
mod search;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{Config, EnvConfig};
use crate::dashboard::Dashboard;
use crate::data::cache::ExpiringCache;
use crate::data::catalog::{CatalogSource, StaticCatalog};
use crate::data::kv_store::{KeyValueStore, MemoryStore, SqliteStore};
use crate::data::types::AssetKind;
use crate::monitoring::logger::SearchLogger;
use crate::monitoring::report;

#[derive(Parser)]
#[command(name = "asset-forecaster", about = "Crypto and stock price forecaster", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the TOML config; defaults apply when the file is missing
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Crypto,
    Stock,
}

impl From<KindArg> for AssetKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Crypto => AssetKind::Crypto,
            KindArg::Stock => AssetKind::Stock,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CurrencyArg {
    #[value(name = "JPY", alias = "jpy")]
    Jpy,
    #[value(name = "USD", alias = "usd")]
    Usd,
}

impl CurrencyArg {
    fn code(self) -> &'static str {
        match self {
            CurrencyArg::Jpy => "JPY",
            CurrencyArg::Usd => "USD",
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Fetch prices, news and a one-year forecast for an asset
    Search {
        query: String,

        #[arg(short, long, value_enum, default_value = "crypto")]
        kind: KindArg,

        /// Display currency (overrides config)
        #[arg(long, value_enum)]
        currency: Option<CurrencyArg>,
    },

    /// List stock candidates for a name, code or ticker
    Lookup { query: String },

    /// Show current exchange rates
    Rates,

    /// Top cryptocurrencies by market cap
    Top {
        /// Display currency (overrides config)
        #[arg(long, value_enum)]
        currency: Option<CurrencyArg>,
    },

    /// Latest business headlines
    Headlines,

    /// Remove cached responses
    ClearCache {
        /// Key prefix such as `quote:` or `news:`; everything when omitted
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

fn display_currency(arg: Option<CurrencyArg>, config: &Config) -> String {
    arg.map(|c| c.code().to_string())
        .unwrap_or_else(|| config.system.display_currency.clone())
}

fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::load(path)
    } else {
        warn!("Config file {} not found, using defaults", path);
        Ok(Config::default())
    }
}

fn build_client(timeout_secs: Option<u64>) -> Result<Client> {
    let mut builder = Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().context("Failed to build HTTP client")
}

fn open_store(db_path: &str) -> Arc<dyn KeyValueStore> {
    match SqliteStore::open(db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Cache database unavailable, caching in memory only: {:#}", e);
            Arc::new(MemoryStore::new())
        }
    }
}

fn load_catalog(path: Option<&str>) -> Result<Arc<dyn CatalogSource>> {
    let catalog = match path {
        Some(path) => StaticCatalog::load(path)?,
        None => StaticCatalog::bundled()?,
    };
    info!("Stock catalog loaded: {} entries", catalog.len());
    Ok(Arc::new(catalog))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "asset_forecaster=info,warn",
        1 => "asset_forecaster=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = load_config(&cli.config)?;
    let env_config = EnvConfig::load();

    if env_config.gemini_api_key.is_none() {
        info!("GEMINI_API_KEY not set, forecasts use the local trend model");
    }

    let cache = ExpiringCache::new(open_store(&config.system.cache_db_path));
    let client = build_client(config.providers.request_timeout_secs)?;
    let catalog = load_catalog(config.system.catalog_path.as_deref())?;

    let dashboard = Dashboard::new(&config, &env_config, client, cache, catalog);

    match cli.command {
        Command::Search { query, kind, currency } => {
            let kind = AssetKind::from(kind);
            let currency_code = display_currency(currency, &config);

            let (committed, rates) = tokio::join!(
                dashboard.run_search(&query, kind),
                dashboard.exchange_rates()
            );

            let Some(view) = dashboard.view().current().filter(|_| committed) else {
                warn!("Search for {} was superseded", query);
                return Ok(());
            };

            print!("{}", report::render_view(&view, &rates, &currency_code)?);

            if config.system.csv_logging {
                let logger = SearchLogger::new(config.system.csv_log_path.clone())?;
                if let Err(e) = logger.log_search(&query, kind, &view) {
                    warn!("Failed to write search log: {:#}", e);
                }
            }
        }
        Command::Lookup { query } => {
            print!("{}", report::render_matches(&dashboard.lookup(&query))?);
        }
        Command::Rates => {
            let rates = dashboard.exchange_rates().await;
            print!("{}", report::render_rates(&rates, &["USD", "JPY", "EUR", "GBP"])?);
        }
        Command::Top { currency } => {
            let (markets, rates) = tokio::join!(dashboard.top_coins(), dashboard.exchange_rates());
            match markets {
                Ok(markets) => {
                    let currency_code = display_currency(currency, &config);
                    print!("{}", report::render_top(&markets, &rates, &currency_code)?);
                }
                Err(e) => {
                    warn!("Top coins fetch failed: {}", e);
                    println!("⚠️ {}", e.user_message());
                }
            }
        }
        Command::Headlines => {
            print!("{}", report::render_headlines(&dashboard.headlines().await)?);
        }
        Command::ClearCache { prefix } => {
            let removed = dashboard.clear_cache(&prefix);
            println!("{} cache entries removed", removed);
        }
    }

    Ok(())
}
