use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub code: String,
    #[serde(rename = "nameJa")]
    pub name_local: String,
    #[serde(rename = "nameEn")]
    pub name_foreign: String,
    pub sector: String,
    pub market: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub entry: CatalogEntry,
    pub score: f64,
}

/// Foreign listing offered alongside domestic search results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignListing {
    pub symbol: &'static str,
    pub name: &'static str,
}

/// Unified stock search hit (domestic entries carry `<code>.T` symbols)
#[derive(Debug, Clone, PartialEq)]
pub struct StockMatch {
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub market: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Epoch millis
    pub timestamp: i64,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl PricePoint {
    pub fn new(timestamp: i64, price: f64) -> Self {
        Self {
            timestamp,
            price,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: Option<String>,
    pub price: f64,
    pub previous_close: f64,
    pub change: f64,
    pub change_percent: f64,
    pub currency: String,
    pub exchange: String,
    /// Epoch seconds of the last regular-market trade
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoMarket {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub total_volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinHit {
    pub id: String,
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: String,
    pub source: String,
    pub url_to_image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Crypto,
    Stock,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Crypto => write!(f, "crypto"),
            AssetKind::Stock => write!(f, "stock"),
        }
    }
}

/// Header data shown above the charts for any asset kind
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSnapshot {
    pub kind: AssetKind,
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change_percent: f64,
    pub currency: String,
    pub exchange: Option<String>,
    pub sector: Option<String>,
    pub market: Option<String>,
    pub market_cap: Option<f64>,
}
