//! Technical indicators over oldest-first price series.
//!
//! Every function returns `None` when the series is shorter than the
//! window it needs.

use serde::Serialize;

pub const RSI_PERIOD: usize = 14;
pub const VOLATILITY_PERIOD: usize = 30;
pub const OVERBOUGHT_RSI: f64 = 70.0;
pub const OVERSOLD_RSI: f64 = 30.0;

/// Simple moving average of the last `period` prices
pub fn sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let window = &prices[prices.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Relative strength index over the last `period + 1` prices
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let window = &prices[prices.len() - (period + 1)..];
    let (gains, losses) = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(gains, losses), diff| {
            if diff >= 0.0 {
                (gains + diff, losses)
            } else {
                (gains, losses + diff.abs())
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Coefficient of variation (%) of the last `period` prices, population std-dev
pub fn volatility(prices: &[f64], period: usize) -> Option<f64> {
    let mean = sma(prices, period)?;
    if mean == 0.0 {
        return None;
    }

    let window = &prices[prices.len() - period..];
    let variance = window.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / period as f64;

    Some(variance.sqrt() / mean * 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sentiment {
    Overbought,
    Oversold,
    Neutral,
}

impl Sentiment {
    pub fn from_rsi(rsi: Option<f64>) -> Self {
        match rsi {
            Some(value) if value > OVERBOUGHT_RSI => Sentiment::Overbought,
            Some(value) if value < OVERSOLD_RSI => Sentiment::Oversold,
            _ => Sentiment::Neutral,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Sentiment::Overbought => "買われすぎ",
            Sentiment::Oversold => "売られすぎ",
            Sentiment::Neutral => "中立",
        }
    }
}

/// The four signals fed to both forecast paths
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub rsi14: Option<f64>,
    pub sma7: Option<f64>,
    pub sma30: Option<f64>,
    pub volatility30: Option<f64>,
}

impl IndicatorSnapshot {
    pub fn compute(prices: &[f64]) -> Self {
        Self {
            rsi14: rsi(prices, RSI_PERIOD),
            sma7: sma(prices, 7),
            sma30: sma(prices, 30),
            volatility30: volatility(prices, VOLATILITY_PERIOD),
        }
    }

    pub fn sentiment(&self) -> Sentiment {
        Sentiment::from_rsi(self.rsi14)
    }
}
