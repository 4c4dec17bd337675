use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use crate::data::types::{CoinHit, CryptoMarket, PricePoint};
use crate::error::DataError;

pub const HISTORY_DAYS: u32 = 365;
const SEARCH_LIMIT: usize = 10;

pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    #[serde(default)]
    prices: Vec<(f64, f64)>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    coins: Vec<CoinHit>,
}

impl CoinGeckoClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Current USD market snapshot for one coin id
    pub async fn fetch_market(&self, coin_id: &str) -> Result<CryptoMarket, DataError> {
        let markets = self.fetch_markets(Some(coin_id), 1).await?;

        markets
            .into_iter()
            .next()
            .ok_or_else(|| DataError::NotFound(format!("Unknown coin id: {}", coin_id)))
    }

    /// Top coins by market cap
    pub async fn fetch_top(&self) -> Result<Vec<CryptoMarket>, DataError> {
        self.fetch_markets(None, 10).await
    }

    async fn fetch_markets(
        &self,
        ids: Option<&str>,
        per_page: u32,
    ) -> Result<Vec<CryptoMarket>, DataError> {
        let url = format!("{}/coins/markets", self.base_url);
        let per_page = per_page.to_string();

        let mut params = vec![
            ("vs_currency", "usd"),
            ("order", "market_cap_desc"),
            ("per_page", per_page.as_str()),
            ("page", "1"),
            ("sparkline", "false"),
        ];
        if let Some(ids) = ids {
            params.push(("ids", ids));
        }

        let markets: Vec<CryptoMarket> = self.client
            .get(&url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(markets)
    }

    /// Daily USD prices for the last `days` days, oldest first
    pub async fn fetch_history(
        &self,
        coin_id: &str,
        days: u32,
    ) -> Result<Vec<PricePoint>, DataError> {
        let url = format!("{}/coins/{}/market_chart", self.base_url, coin_id);
        let days = days.to_string();

        let response: MarketChartResponse = self.client
            .get(&url)
            .query(&[("vs_currency", "usd"), ("days", days.as_str()), ("interval", "daily")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let history = history_from_prices(response.prices);
        if history.is_empty() {
            return Err(DataError::NotFound(format!("No price history for {}", coin_id)));
        }

        Ok(history)
    }

    /// Coins matching a name or symbol, best match first
    pub async fn search(&self, query: &str) -> Result<Vec<CoinHit>, DataError> {
        let url = format!("{}/search", self.base_url);

        let response: SearchResponse = self.client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.coins.into_iter().take(SEARCH_LIMIT).collect())
    }

    /// Resolve a symbol or name to a coin id.
    ///
    /// The query is tried as an id first, then the top search hit wins.
    pub async fn resolve_coin_id(&self, query: &str) -> Result<String, DataError> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Err(DataError::NotFound("Empty crypto query".to_string()));
        }

        match self.fetch_market(&query).await {
            Ok(_) => return Ok(query),
            Err(e) => debug!("{} is not a coin id ({}), searching", query, e),
        }

        match self.search(&query).await {
            Ok(hits) => {
                if let Some(hit) = hits.into_iter().next() {
                    return Ok(hit.id);
                }
            }
            Err(e) => warn!("Coin search failed for {}: {}", query, e),
        }

        Err(DataError::NotFound(format!("Crypto not found: {}", query)))
    }
}

/// `[millis, price]` pairs to price points; non-increasing timestamps are dropped
fn history_from_prices(prices: Vec<(f64, f64)>) -> Vec<PricePoint> {
    let mut history: Vec<PricePoint> = Vec::with_capacity(prices.len());

    for (timestamp, price) in prices {
        let timestamp = timestamp as i64;
        if !price.is_finite() || history.last().is_some_and(|last| last.timestamp >= timestamp) {
            continue;
        }
        history.push(PricePoint::new(timestamp, price));
    }

    history
}
