use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;
use crate::error::DataError;

pub const PIVOT_CURRENCY: &str = "USD";

/// Units of each currency per one USD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRates {
    rates: HashMap<String, f64>,
}

impl ExchangeRates {
    pub fn new(rates: HashMap<String, f64>) -> Self {
        Self { rates }
    }

    /// Used whenever the rate provider is unreachable
    pub fn fallback() -> Self {
        let rates = [("USD", 1.0), ("JPY", 150.0), ("EUR", 0.92), ("GBP", 0.79)]
            .into_iter()
            .map(|(code, rate)| (code.to_string(), rate))
            .collect();
        Self { rates }
    }

    pub fn rate(&self, currency: &str) -> Option<f64> {
        self.rates.get(currency).copied()
    }
}

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    rates: Option<HashMap<String, f64>>,
}

pub struct FxClient {
    client: Client,
    base_url: String,
}

impl FxClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Fetch USD-based rates, falling back to the fixed table
    pub async fn fetch_rates(&self) -> ExchangeRates {
        match self.try_fetch_rates().await {
            Ok(rates) => rates,
            Err(e) => {
                warn!("Exchange rate fetch failed, using fallback rates: {}", e);
                ExchangeRates::fallback()
            }
        }
    }

    async fn try_fetch_rates(&self) -> Result<ExchangeRates, DataError> {
        let url = format!("{}/latest/{}", self.base_url, PIVOT_CURRENCY);

        let response: LatestRatesResponse = self.client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .rates
            .filter(|rates| !rates.is_empty())
            .map(ExchangeRates::new)
            .ok_or_else(|| DataError::Parse("Exchange rate response has no rates".to_string()))
    }
}

/// Convert through the USD pivot. `None` when a needed rate is missing or zero.
pub fn convert(amount: f64, from: &str, to: &str, rates: &ExchangeRates) -> Option<f64> {
    if from == to {
        return Some(amount);
    }

    let amount_usd = if from == PIVOT_CURRENCY {
        amount
    } else {
        let rate = rates.rate(from).filter(|rate| *rate != 0.0)?;
        amount / rate
    };

    if to == PIVOT_CURRENCY {
        Some(amount_usd)
    } else {
        rates
            .rate(to)
            .filter(|rate| *rate != 0.0)
            .map(|rate| amount_usd * rate)
    }
}

pub fn currency_symbol(currency: &str) -> &str {
    match currency {
        "USD" => "$",
        "JPY" => "¥",
        "EUR" => "€",
        "GBP" => "£",
        other => other,
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::new();
    for (i, ch) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped.chars().rev().collect()
}

/// JPY without decimals, everything else with two
pub fn format_currency(amount: f64, currency: &str) -> String {
    let decimals: usize = if currency == "JPY" { 0 } else { 2 };
    let formatted = format!("{:.*}", decimals, amount.abs());

    let (whole, fraction) = match formatted.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (formatted.as_str(), None),
    };

    let sign = if amount < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0') {
        "-"
    } else {
        ""
    };

    let mut out = format!("{}{}{}", sign, currency_symbol(currency), group_thousands(whole));
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_identity_and_pivot() {
        let rates = ExchangeRates::fallback();

        assert_eq!(convert(42.0, "JPY", "JPY", &rates), Some(42.0));
        assert_eq!(convert(10.0, "USD", "JPY", &rates), Some(1500.0));
        assert_eq!(convert(1500.0, "JPY", "USD", &rates), Some(10.0));

        let eur_to_gbp = convert(92.0, "EUR", "GBP", &rates).unwrap();
        assert!((eur_to_gbp - 79.0).abs() < 1e-9);
    }

    #[test]
    fn test_convert_round_trip() {
        let rates = ExchangeRates::fallback();
        let yen = convert(100.0, "USD", "JPY", &rates).unwrap();
        let back = convert(yen, "JPY", "USD", &rates).unwrap();

        assert!((back - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_convert_missing_rate() {
        let rates = ExchangeRates::fallback();
        assert_eq!(convert(1.0, "USD", "CHF", &rates), None);
        assert_eq!(convert(1.0, "CHF", "USD", &rates), None);

        let zero = ExchangeRates::new([("JPY".to_string(), 0.0)].into_iter().collect());
        assert_eq!(convert(1.0, "USD", "JPY", &zero), None);
        assert_eq!(convert(1.0, "JPY", "USD", &zero), None);
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(1_234_567.0, "JPY"), "¥1,234,567");
        assert_eq!(format_currency(2845.4, "JPY"), "¥2,845");
        assert_eq!(format_currency(178.25, "USD"), "$178.25");
        assert_eq!(format_currency(1_000_000.5, "EUR"), "€1,000,000.50");
        assert_eq!(format_currency(-12.5, "GBP"), "-£12.50");
        assert_eq!(format_currency(10.0, "CHF"), "CHF10.00");
    }

    #[test]
    fn test_rates_response_parsing() {
        let json = r#"{"base":"USD","rates":{"USD":1,"JPY":149.5}}"#;
        let parsed: LatestRatesResponse = serde_json::from_str(json).unwrap();
        let rates = ExchangeRates::new(parsed.rates.unwrap());

        assert_eq!(rates.rate("JPY"), Some(149.5));
    }
}
