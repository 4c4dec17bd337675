use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::debug;
use crate::data::types::{PricePoint, Quote};
use crate::error::DataError;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

pub struct YahooClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: Option<ChartIndicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    previous_close: Option<f64>,
    #[serde(default)]
    chart_previous_close: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    full_exchange_name: Option<String>,
    #[serde(default)]
    regular_market_time: Option<i64>,
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn domestic_code_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\d{4})(?:\.[Tt])?$").ok())
        .as_ref()
}

/// Four-digit Tokyo code in `query`, with or without the `.T` suffix
pub fn domestic_code(query: &str) -> Option<String> {
    let cap = domestic_code_pattern()?.captures(query.trim())?;
    Some(cap[1].to_string())
}

/// Yahoo symbol for a ticker: domestic codes get `.T`
pub fn yahoo_symbol(symbol: &str) -> String {
    match domestic_code(symbol) {
        Some(code) => format!("{}.T", code),
        None => symbol.trim().to_uppercase(),
    }
}

impl YahooClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Current quote; change and change percent are derived from the previous close
    pub async fn fetch_quote(&self, symbol: &str) -> Result<Quote, DataError> {
        let symbol = yahoo_symbol(symbol);
        let result = self.fetch_chart(&symbol, None).await?;
        quote_from_meta(&symbol, result.meta)
    }

    /// Daily history, oldest first
    pub async fn fetch_history(
        &self,
        symbol: &str,
        range: &str,
        interval: &str,
    ) -> Result<Vec<PricePoint>, DataError> {
        let symbol = yahoo_symbol(symbol);
        let result = self.fetch_chart(&symbol, Some((range, interval))).await?;
        let history = history_from_result(result);

        if history.is_empty() {
            return Err(DataError::NotFound(format!("No historical data for {}", symbol)));
        }

        debug!("Fetched {} history points for {}", history.len(), symbol);
        Ok(history)
    }

    async fn fetch_chart(
        &self,
        symbol: &str,
        range: Option<(&str, &str)>,
    ) -> Result<ChartResult, DataError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);

        let mut request = self.client
            .get(&url)
            .header("User-Agent", USER_AGENT);
        if let Some((range, interval)) = range {
            request = request.query(&[("range", range), ("interval", interval)]);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(DataError::NotFound(format!("Stock not found: {}", symbol)));
        }

        let body: ChartResponse = response.error_for_status()?.json().await?;
        first_result(symbol, body)
    }
}

fn first_result(symbol: &str, body: ChartResponse) -> Result<ChartResult, DataError> {
    if let Some(error) = body.chart.error {
        let description = error.description.unwrap_or_else(|| "unknown chart error".to_string());
        return Err(DataError::NotFound(format!("{}: {}", symbol, description)));
    }

    body.chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| DataError::NotFound(format!("No data available for symbol {}", symbol)))
}

fn quote_from_meta(symbol: &str, meta: ChartMeta) -> Result<Quote, DataError> {
    let price = meta
        .regular_market_price
        .ok_or_else(|| DataError::Parse(format!("Missing market price for {}", symbol)))?;
    let previous_close = meta
        .previous_close
        .or(meta.chart_previous_close)
        .unwrap_or(price);

    let change = price - previous_close;
    let change_percent = if previous_close != 0.0 {
        change / previous_close * 100.0
    } else {
        0.0
    };

    Ok(Quote {
        symbol: symbol.to_string(),
        name: meta.long_name.or(meta.short_name),
        price,
        previous_close,
        change,
        change_percent,
        currency: meta.currency.unwrap_or_else(|| "USD".to_string()),
        exchange: meta.full_exchange_name.unwrap_or_default(),
        timestamp: meta.regular_market_time.unwrap_or_default(),
    })
}

/// Zip timestamps with OHLCV rows, dropping null closes and out-of-order rows
fn history_from_result(result: ChartResult) -> Vec<PricePoint> {
    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result
        .indicators
        .and_then(|indicators| indicators.quote.into_iter().next())
        .unwrap_or_default();

    let at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();

    let mut history: Vec<PricePoint> = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let Some(close) = at(&quote.close, i) else {
            continue;
        };

        let timestamp = ts * 1000;
        if history.last().is_some_and(|last| last.timestamp >= timestamp) {
            continue;
        }

        history.push(PricePoint {
            timestamp,
            price: close,
            open: at(&quote.open, i),
            high: at(&quote.high, i),
            low: at(&quote.low, i),
            close: Some(close),
            volume: at(&quote.volume, i),
        });
    }

    history
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHART_JSON: &str = r#"{
        "chart": {
            "result": [{
                "meta": {
                    "currency": "JPY",
                    "symbol": "7203.T",
                    "fullExchangeName": "Tokyo",
                    "regularMarketPrice": 2880.0,
                    "regularMarketTime": 1760000000,
                    "chartPreviousClose": 2845.0,
                    "longName": "Toyota Motor Corporation"
                },
                "timestamp": [1759900000, 1759986400, 1760072800, 1760072800],
                "indicators": {
                    "quote": [{
                        "open": [2800.0, 2810.0, 2850.0, 2850.0],
                        "high": [2820.0, 2830.0, 2890.0, 2890.0],
                        "low": [2790.0, 2800.0, 2840.0, 2840.0],
                        "close": [2815.0, null, 2880.0, 2881.0],
                        "volume": [1000000, 1200000, 900000, 900000]
                    }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_domestic_code() {
        assert!(domestic_code_pattern().is_some());
        assert_eq!(domestic_code("6758.t"), Some("6758".to_string()));
        assert_eq!(domestic_code("7203"), Some("7203".to_string()));
        assert_eq!(domestic_code(" 7203.T "), Some("7203".to_string()));
        assert_eq!(domestic_code("72030"), None);
        assert_eq!(domestic_code("AAPL"), None);

        assert_eq!(yahoo_symbol("7203"), "7203.T");
        assert_eq!(yahoo_symbol("aapl"), "AAPL");
    }

    #[test]
    fn test_quote_from_chart() {
        let body: ChartResponse = serde_json::from_str(CHART_JSON).unwrap();
        let result = first_result("7203.T", body).unwrap();
        let quote = quote_from_meta("7203.T", result.meta).unwrap();

        assert_eq!(quote.price, 2880.0);
        assert_eq!(quote.previous_close, 2845.0);
        assert_eq!(quote.change, 35.0);
        assert!((quote.change_percent - 1.2302).abs() < 0.001);
        assert_eq!(quote.currency, "JPY");
        assert_eq!(quote.name.as_deref(), Some("Toyota Motor Corporation"));
    }

    #[test]
    fn test_history_from_chart() {
        let body: ChartResponse = serde_json::from_str(CHART_JSON).unwrap();
        let history = history_from_result(first_result("7203.T", body).unwrap());

        // null close dropped, duplicate timestamp dropped
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].timestamp, 1_759_900_000_000);
        assert_eq!(history[1].price, 2880.0);
        assert_eq!(history[1].volume, Some(900000.0));
        assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_chart_error_is_not_found() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let body: ChartResponse = serde_json::from_str(json).unwrap();

        assert!(matches!(first_result("0000.T", body), Err(DataError::NotFound(_))));
    }
}
