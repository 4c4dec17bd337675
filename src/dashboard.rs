//! Search orchestration: resolve the query, fetch quote, history and news
//! through the cache, forecast, and publish the result to the view.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use crate::ai::gemini::{CompletionProvider, GeminiClient};
use crate::analysis::forecast::{ForecastGenerator, ForecastInput, ForecastResult};
use crate::analysis::indicators::IndicatorSnapshot;
use crate::config::{CacheConfig, Config, EnvConfig};
use crate::data::cache::ExpiringCache;
use crate::data::catalog::{CatalogSource, FOREIGN_LISTINGS};
use crate::data::coingecko::{CoinGeckoClient, HISTORY_DAYS};
use crate::data::fx::{ExchangeRates, FxClient, PIVOT_CURRENCY};
use crate::data::news::NewsClient;
use crate::data::types::{
    AssetKind, AssetSnapshot, CatalogEntry, CryptoMarket, ForeignListing, NewsArticle, PricePoint,
    Quote, StockMatch,
};
use crate::data::yahoo::{domestic_code, YahooClient};
use crate::error::DataError;
use crate::search::fuzzy;

/// A stock query resolved to a chart symbol
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStock {
    pub symbol: String,
    pub name_local: Option<String>,
    pub name_foreign: Option<String>,
    pub sector: Option<String>,
    pub market: Option<String>,
}

impl ResolvedStock {
    fn from_entry(entry: &CatalogEntry) -> Self {
        Self {
            symbol: format!("{}.T", entry.code),
            name_local: Some(entry.name_local.clone()),
            name_foreign: Some(entry.name_foreign.clone()),
            sector: Some(entry.sector.clone()),
            market: Some(entry.market.clone()),
        }
    }

    fn from_listing(listing: &ForeignListing) -> Self {
        Self {
            symbol: listing.symbol.to_string(),
            name_local: None,
            name_foreign: Some(listing.name.to_string()),
            sector: None,
            market: None,
        }
    }

    fn ticker(symbol: String) -> Self {
        Self {
            symbol,
            name_local: None,
            name_foreign: None,
            sector: None,
            market: None,
        }
    }
}

/// Resolve a stock query.
///
/// Order: four-digit code, best domestic fuzzy hit, foreign listing,
/// then the upper-cased query as a raw ticker.
pub fn resolve_stock(
    catalog: &dyn CatalogSource,
    listings: &[ForeignListing],
    query: &str,
) -> Result<ResolvedStock, DataError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(DataError::NotFound("Empty stock query".to_string()));
    }

    if let Some(code) = domestic_code(query) {
        return Ok(match catalog.by_code(&code) {
            Some(entry) => ResolvedStock::from_entry(entry),
            None => ResolvedStock::ticker(format!("{}.T", code)),
        });
    }

    if let Some(hit) = fuzzy::search(catalog.entries(), query).first() {
        return Ok(ResolvedStock::from_entry(&hit.entry));
    }

    if let Some(listing) = fuzzy::search_foreign(listings, query).first() {
        return Ok(ResolvedStock::from_listing(listing));
    }

    Ok(ResolvedStock::ticker(query.to_uppercase()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub snapshot: AssetSnapshot,
    pub history: Vec<PricePoint>,
    pub indicators: IndicatorSnapshot,
    pub news: Vec<NewsArticle>,
    pub forecast: ForecastResult,
}

/// What the view shows for the latest search
#[derive(Debug, Clone, PartialEq)]
pub enum SearchView {
    Ready(Box<SearchOutcome>),
    Failed(String),
}

/// Last-write-wins view guarded by generation tickets.
///
/// Only the most recently issued ticket may commit.
#[derive(Debug, Default)]
pub struct ViewState {
    generation: AtomicU64,
    current: Mutex<Option<SearchView>>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a ticket for a new search, superseding all earlier ones
    pub fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn commit(&self, ticket: u64, view: SearchView) -> bool {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);

        // Checked under the lock so a stale commit cannot interleave
        let latest = self.generation.load(Ordering::SeqCst);
        if ticket != latest {
            debug!("Discarding stale search result (ticket {}, latest {})", ticket, latest);
            return false;
        }

        *current = Some(view);
        true
    }

    pub fn current(&self) -> Option<SearchView> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Snapshot, price history and the name news is searched under
type LoadedAsset = (AssetSnapshot, Vec<PricePoint>, String);

pub struct Dashboard {
    yahoo: YahooClient,
    coingecko: CoinGeckoClient,
    news: NewsClient,
    fx: FxClient,
    forecaster: ForecastGenerator,
    cache: ExpiringCache,
    catalog: Arc<dyn CatalogSource>,
    ttl: CacheConfig,
    news_page_size: u32,
    history_range: String,
    history_interval: String,
    view: ViewState,
}

impl Dashboard {
    pub fn new(
        config: &Config,
        env: &EnvConfig,
        client: Client,
        cache: ExpiringCache,
        catalog: Arc<dyn CatalogSource>,
    ) -> Self {
        let providers = &config.providers;

        let llm: Option<Arc<dyn CompletionProvider>> = env.gemini_api_key.as_ref().map(|key| {
            Arc::new(GeminiClient::new(
                client.clone(),
                providers.gemini_base_url.clone(),
                providers.gemini_model.clone(),
                key.clone(),
            )) as Arc<dyn CompletionProvider>
        });

        Self {
            yahoo: YahooClient::new(client.clone(), providers.yahoo_base_url.clone()),
            coingecko: CoinGeckoClient::new(client.clone(), providers.coingecko_base_url.clone()),
            news: NewsClient::new(
                client.clone(),
                providers.news_base_url.clone(),
                env.news_api_key.clone(),
            ),
            fx: FxClient::new(client, providers.fx_base_url.clone()),
            forecaster: ForecastGenerator::new(llm),
            cache,
            catalog,
            ttl: config.cache.clone(),
            news_page_size: providers.news_page_size,
            history_range: providers.history_range.clone(),
            history_interval: providers.history_interval.clone(),
            view: ViewState::new(),
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Run a search and publish its result unless a newer search has started.
    ///
    /// Returns whether the result was committed.
    pub async fn run_search(&self, query: &str, kind: AssetKind) -> bool {
        let ticket = self.view.begin();

        let view = match self.search(query, kind).await {
            Ok(outcome) => SearchView::Ready(Box::new(outcome)),
            Err(e) => {
                warn!("Search for {} ({}) failed: {}", query, kind, e);
                SearchView::Failed(e.user_message().to_string())
            }
        };

        self.view.commit(ticket, view)
    }

    pub async fn search(&self, query: &str, kind: AssetKind) -> Result<SearchOutcome, DataError> {
        info!("Searching {} for {}", kind, query);

        let (snapshot, history, news_query) = match kind {
            AssetKind::Crypto => self.load_crypto(query).await?,
            AssetKind::Stock => self.load_stock(query).await?,
        };

        let news = self.asset_news(&news_query).await;

        let prices: Vec<f64> = history.iter().map(|p| p.price).collect();
        let indicators = IndicatorSnapshot::compute(&prices);

        let input = ForecastInput {
            asset_name: &snapshot.name,
            kind,
            currency: &snapshot.currency,
            history: &history,
            news: &news,
        };
        let forecast = self.forecaster.forecast(&input).await?;

        info!(
            "{} ({}): {} history points, {} articles, forecast via {:?}",
            snapshot.name,
            snapshot.symbol,
            history.len(),
            news.len(),
            forecast.source
        );

        Ok(SearchOutcome {
            snapshot,
            history,
            indicators,
            news,
            forecast,
        })
    }

    async fn load_stock(&self, query: &str) -> Result<LoadedAsset, DataError> {
        let resolved = resolve_stock(self.catalog.as_ref(), FOREIGN_LISTINGS, query)?;
        let symbol = resolved.symbol.clone();
        debug!("Resolved {} to {}", query, symbol);

        let quote: Quote = self
            .cached(self.key("quote", &symbol), self.ttl.quote_ttl_minutes, || {
                self.yahoo.fetch_quote(&symbol)
            })
            .await?;

        let history: Vec<PricePoint> = self
            .cached(self.key("history", &symbol), self.ttl.history_ttl_minutes, || {
                self.yahoo.fetch_history(&symbol, &self.history_range, &self.history_interval)
            })
            .await?;

        let name = resolved
            .name_local
            .clone()
            .or_else(|| quote.name.clone())
            .unwrap_or_else(|| symbol.clone());
        let news_query = resolved
            .name_foreign
            .clone()
            .or_else(|| quote.name.clone())
            .unwrap_or_else(|| name.clone());

        let snapshot = AssetSnapshot {
            kind: AssetKind::Stock,
            symbol: quote.symbol,
            name,
            price: quote.price,
            change_percent: quote.change_percent,
            currency: quote.currency,
            exchange: Some(quote.exchange).filter(|exchange| !exchange.is_empty()),
            sector: resolved.sector,
            market: resolved.market,
            market_cap: None,
        };

        Ok((snapshot, history, news_query))
    }

    async fn load_crypto(&self, query: &str) -> Result<LoadedAsset, DataError> {
        let normalized = query.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(DataError::NotFound("Empty crypto query".to_string()));
        }

        let coin_id: String = self
            .cached(self.key("crypto-id", &normalized), self.ttl.crypto_id_ttl_minutes, || {
                self.coingecko.resolve_coin_id(&normalized)
            })
            .await?;
        debug!("Resolved {} to coin id {}", query, coin_id);

        let market: CryptoMarket = self
            .cached(self.key("crypto", &coin_id), self.ttl.quote_ttl_minutes, || {
                self.coingecko.fetch_market(&coin_id)
            })
            .await?;

        let history: Vec<PricePoint> = self
            .cached(self.key("crypto-history", &coin_id), self.ttl.history_ttl_minutes, || {
                self.coingecko.fetch_history(&coin_id, HISTORY_DAYS)
            })
            .await?;

        let news_query = market.name.clone();
        let snapshot = AssetSnapshot {
            kind: AssetKind::Crypto,
            symbol: market.symbol.to_uppercase(),
            name: market.name,
            price: market.current_price,
            change_percent: market.price_change_percentage_24h.unwrap_or_default(),
            currency: PIVOT_CURRENCY.to_string(),
            exchange: None,
            sector: None,
            market: None,
            market_cap: market.market_cap,
        };

        Ok((snapshot, history, news_query))
    }

    async fn asset_news(&self, query: &str) -> Vec<NewsArticle> {
        let key = self.key("news", query);
        if let Some(articles) = self.cache.get::<Vec<NewsArticle>>(&key) {
            return articles;
        }

        let articles = self.news.fetch_asset_news(query, self.news_page_size).await;
        self.cache.set(&key, &articles, self.ttl.news_ttl_minutes);
        articles
    }

    /// Rates per USD, cached; the fixed table stands in when the provider fails
    pub async fn exchange_rates(&self) -> ExchangeRates {
        let key = self.key("fx", PIVOT_CURRENCY);
        if let Some(rates) = self.cache.get::<ExchangeRates>(&key) {
            return rates;
        }

        let rates = self.fx.fetch_rates().await;
        self.cache.set(&key, &rates, self.ttl.fx_ttl_minutes);
        rates
    }

    /// Top coins by market cap
    pub async fn top_coins(&self) -> Result<Vec<CryptoMarket>, DataError> {
        self.cached(self.key("crypto-top", "market_cap"), self.ttl.quote_ttl_minutes, || {
            self.coingecko.fetch_top()
        })
        .await
    }

    /// General business headlines
    pub async fn headlines(&self) -> Vec<NewsArticle> {
        let key = self.key("headlines", "business");
        if let Some(articles) = self.cache.get::<Vec<NewsArticle>>(&key) {
            return articles;
        }

        let articles = self.news.fetch_headlines(self.news_page_size).await;
        self.cache.set(&key, &articles, self.ttl.news_ttl_minutes);
        articles
    }

    /// Domestic and foreign stock candidates for a query
    pub fn lookup(&self, query: &str) -> Vec<StockMatch> {
        fuzzy::search_stocks(self.catalog.entries(), FOREIGN_LISTINGS, query)
    }

    /// Drop cached entries under `prefix` (relative to the configured key prefix)
    pub fn clear_cache(&self, prefix: &str) -> usize {
        let removed = self.cache.clear(&format!("{}{}", self.ttl.key_prefix, prefix));
        info!("Cleared {} cache entries", removed);
        removed
    }

    fn key(&self, kind: &str, id: &str) -> String {
        format!("{}{}:{}", self.ttl.key_prefix, kind, id)
    }

    async fn cached<T, F, Fut>(
        &self,
        key: String,
        ttl_minutes: u64,
        fetch: F,
    ) -> Result<T, DataError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DataError>>,
    {
        if let Some(value) = self.cache.get::<T>(&key) {
            debug!("Cache hit: {}", key);
            return Ok(value);
        }

        let value = fetch().await?;
        self.cache.set(&key, &value, ttl_minutes);
        Ok(value)
    }
}
