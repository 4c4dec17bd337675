use anyhow::{Context, Result};
use std::fs;
use crate::data::types::{CatalogEntry, ForeignListing};

const BUNDLED_CATALOG: &str = include_str!("../../data/japanese-stocks.json");

/// Foreign tickers offered by stock search next to the domestic catalog
pub const FOREIGN_LISTINGS: &[ForeignListing] = &[
    ForeignListing { symbol: "AAPL", name: "Apple Inc." },
    ForeignListing { symbol: "GOOGL", name: "Alphabet Inc." },
    ForeignListing { symbol: "MSFT", name: "Microsoft Corporation" },
    ForeignListing { symbol: "TSLA", name: "Tesla, Inc." },
    ForeignListing { symbol: "AMZN", name: "Amazon.com, Inc." },
    ForeignListing { symbol: "META", name: "Meta Platforms, Inc." },
    ForeignListing { symbol: "NVDA", name: "NVIDIA Corporation" },
    ForeignListing { symbol: "JPM", name: "JPMorgan Chase & Co." },
];

/// Read-only source of domestic equities, loaded once at startup
pub trait CatalogSource: Send + Sync {
    fn entries(&self) -> &[CatalogEntry];

    fn by_code(&self, code: &str) -> Option<&CatalogEntry> {
        self.entries().iter().find(|entry| entry.code == code)
    }
}

#[derive(Debug, Clone)]
pub struct StaticCatalog {
    entries: Vec<CatalogEntry>,
}

impl StaticCatalog {
    /// Catalog compiled into the binary
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_CATALOG).context("Failed to parse bundled stock catalog")
    }

    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read stock catalog: {}", path))?;

        Self::from_json(&contents)
            .with_context(|| format!("Failed to parse stock catalog: {}", path))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl CatalogSource for StaticCatalog {
    fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }
}
