//! Plain-text rendering of search results for the terminal.

use chrono::{DateTime, Utc};
use std::fmt::{self, Write};
use crate::analysis::forecast::{anchor_day, Factor, ForecastSource};
use crate::dashboard::{SearchOutcome, SearchView};
use crate::data::fx::{convert, format_currency, ExchangeRates, PIVOT_CURRENCY};
use crate::data::types::{AssetKind, CryptoMarket, NewsArticle, StockMatch};

/// Months shown as forecast checkpoints
pub const CHECKPOINT_MONTHS: [u32; 4] = [1, 3, 6, 12];

/// Rendered text; writing into a `String` only fails on a broken `Display`
pub type Rendered = Result<String, fmt::Error>;

const RULE: &str = "────────────────────────────────────────";

/// Amounts in the display currency, or the asset's own currency when no rate is known
struct Money<'a> {
    rates: &'a ExchangeRates,
    from: &'a str,
    to: &'a str,
}

impl Money<'_> {
    fn format(&self, amount: f64) -> String {
        match convert(amount, self.from, self.to, self.rates) {
            Some(converted) => format_currency(converted, self.to),
            None => format_currency(amount, self.from),
        }
    }

    fn format_opt(&self, amount: Option<f64>) -> String {
        amount.map(|a| self.format(a)).unwrap_or_else(|| "データ不足".to_string())
    }
}

fn signed_pct(value: f64) -> String {
    format!("{:+.2}%", value)
}

fn date(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn write_factors(out: &mut String, heading: &str, factors: &[Factor]) -> fmt::Result {
    writeln!(out, "\n【{}】", heading)?;
    if factors.is_empty() {
        writeln!(out, "  (なし)")?;
    }
    for (i, factor) in factors.iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, factor.title)?;
        writeln!(out, "     {}", factor.reasoning)?;
    }
    Ok(())
}

pub fn render_view(view: &SearchView, rates: &ExchangeRates, display_currency: &str) -> Rendered {
    match view {
        SearchView::Ready(outcome) => render_outcome(outcome, rates, display_currency),
        SearchView::Failed(message) => Ok(format!("⚠️ {}\n", message)),
    }
}

pub fn render_outcome(
    outcome: &SearchOutcome,
    rates: &ExchangeRates,
    display_currency: &str,
) -> Rendered {
    let snapshot = &outcome.snapshot;
    let money = Money {
        rates,
        from: &snapshot.currency,
        to: display_currency,
    };
    let mut out = String::new();

    let kind = match snapshot.kind {
        AssetKind::Crypto => "仮想通貨",
        AssetKind::Stock => "株式",
    };
    writeln!(out, "{}", RULE)?;
    writeln!(out, "{} ({}) [{}]", snapshot.name, snapshot.symbol, kind)?;

    let details: Vec<&str> = [&snapshot.exchange, &snapshot.market, &snapshot.sector]
        .into_iter()
        .filter_map(|field| field.as_deref())
        .collect();
    if !details.is_empty() {
        writeln!(out, "{}", details.join(" / "))?;
    }
    writeln!(out, "{}", RULE)?;

    writeln!(
        out,
        "現在価格: {} ({})",
        money.format(snapshot.price),
        signed_pct(snapshot.change_percent)
    )?;
    if let Some(market_cap) = snapshot.market_cap {
        writeln!(out, "時価総額: {}", money.format(market_cap))?;
    }

    if let (Some(first), Some(last)) = (outcome.history.first(), outcome.history.last()) {
        let high = outcome.history.iter().map(|p| p.price).fold(f64::MIN, f64::max);
        let low = outcome.history.iter().map(|p| p.price).fold(f64::MAX, f64::min);
        writeln!(
            out,
            "価格履歴: {} 〜 {} ({}件) 高値 {} / 安値 {}",
            date(first.timestamp),
            date(last.timestamp),
            outcome.history.len(),
            money.format(high),
            money.format(low)
        )?;
    }

    let indicators = &outcome.indicators;
    writeln!(out, "\n【テクニカル指標】")?;
    writeln!(
        out,
        "  RSI(14): {} ({})",
        indicators
            .rsi14
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "データ不足".to_string()),
        indicators.sentiment().label()
    )?;
    writeln!(out, "  SMA(7):  {}", money.format_opt(indicators.sma7))?;
    writeln!(out, "  SMA(30): {}", money.format_opt(indicators.sma30))?;
    writeln!(
        out,
        "  ボラティリティ(30): {}",
        indicators
            .volatility30
            .map(|v| format!("{:.2}%", v))
            .unwrap_or_else(|| "データ不足".to_string())
    )?;

    let forecast = &outcome.forecast;
    let source = match forecast.source {
        ForecastSource::Llm => "AI",
        ForecastSource::Fallback => "簡易トレンドモデル",
    };
    writeln!(
        out,
        "\n【1年間の価格予測】 (予測元: {} / 信頼度: {})",
        source,
        forecast.confidence.label()
    )?;
    for month in CHECKPOINT_MONTHS {
        let Some(point) = anchor_day(month)
            .checked_sub(1)
            .and_then(|index| forecast.predictions.get(index))
        else {
            continue;
        };
        let change = if snapshot.price != 0.0 {
            (point.price - snapshot.price) / snapshot.price * 100.0
        } else {
            0.0
        };
        writeln!(
            out,
            "  {:>2}ヶ月後 ({}): {} ({})",
            month,
            date(point.timestamp),
            money.format(point.price),
            signed_pct(change)
        )?;
    }

    writeln!(out, "\n【分析】\n{}", forecast.analysis)?;
    write_factors(&mut out, "主要な成長要因", &forecast.key_factors)?;
    write_factors(&mut out, "潜在的リスク", &forecast.risks)?;

    writeln!(out, "\n【最新ニュース】")?;
    for article in &outcome.news {
        let when = &article.published_at;
        writeln!(out, "  - {} ({} {})", article.title, article.source, when)?;
    }

    Ok(out)
}

/// One line per currency, as units per USD
pub fn render_rates(rates: &ExchangeRates, currencies: &[&str]) -> Rendered {
    let mut out = String::from("1 USD =\n");
    for currency in currencies {
        match rates.rate(currency) {
            Some(rate) => writeln!(out, "  {} {:.4}", currency, rate)?,
            None => writeln!(out, "  {} -", currency)?,
        }
    }
    Ok(out)
}

pub fn render_top(
    markets: &[CryptoMarket],
    rates: &ExchangeRates,
    display_currency: &str,
) -> Rendered {
    let money = Money {
        rates,
        from: PIVOT_CURRENCY,
        to: display_currency,
    };

    let mut out = String::new();
    for (rank, market) in markets.iter().enumerate() {
        let change = market
            .price_change_percentage_24h
            .map(signed_pct)
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:>2}. {:<6} {:<16} {:>18} {:>9}  時価総額 {}",
            rank + 1,
            market.symbol.to_uppercase(),
            market.name,
            money.format(market.current_price),
            change,
            money.format_opt(market.market_cap)
        )?;
    }
    Ok(out)
}

pub fn render_headlines(articles: &[NewsArticle]) -> Rendered {
    let mut out = String::new();
    for article in articles {
        writeln!(out, "- {}", article.title)?;
        writeln!(out, "  {} {}", article.source, article.published_at)?;
        if !article.url.is_empty() && article.url != "#" {
            writeln!(out, "  {}", article.url)?;
        }
    }
    Ok(out)
}

pub fn render_matches(matches: &[StockMatch]) -> Rendered {
    if matches.is_empty() {
        return Ok("該当する銘柄はありません\n".to_string());
    }

    let mut out = String::new();
    for m in matches {
        let details: Vec<&str> = [&m.sector, &m.market]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .collect();
        if details.is_empty() {
            writeln!(out, "{:<8} {}", m.symbol, m.name)?;
        } else {
            writeln!(out, "{:<8} {} ({})", m.symbol, m.name, details.join(", "))?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::forecast::{Confidence, ForecastResult, DAY_MS, FORECAST_DAYS};
    use crate::analysis::indicators::IndicatorSnapshot;
    use crate::data::types::{AssetSnapshot, PricePoint};

    const START: i64 = 1_760_000_000_000;

    fn outcome() -> SearchOutcome {
        let history: Vec<PricePoint> = (0..40)
            .map(|i| PricePoint::new(START - (40 - i) * DAY_MS, 100.0 + i as f64))
            .collect();
        let prices: Vec<f64> = history.iter().map(|p| p.price).collect();
        let predictions = (1..=FORECAST_DAYS as i64)
            .map(|d| PricePoint::new(START + d * DAY_MS, 200.0))
            .collect();

        SearchOutcome {
            snapshot: AssetSnapshot {
                kind: AssetKind::Stock,
                symbol: "AAPL".to_string(),
                name: "Apple Inc.".to_string(),
                price: 100.0,
                change_percent: -0.5,
                currency: "USD".to_string(),
                exchange: Some("NasdaqGS".to_string()),
                sector: None,
                market: None,
                market_cap: None,
            },
            indicators: IndicatorSnapshot::compute(&prices),
            history,
            news: Vec::new(),
            forecast: ForecastResult {
                predictions,
                analysis: "分析テキスト".to_string(),
                confidence: Confidence::High,
                key_factors: vec![Factor::new("新製品", "需要増")],
                risks: Vec::new(),
                source: ForecastSource::Llm,
            },
        }
    }

    #[test]
    fn test_report_converts_to_display_currency() {
        let report = render_outcome(&outcome(), &ExchangeRates::fallback(), "JPY").unwrap();

        assert!(report.contains("Apple Inc. (AAPL) [株式]"));
        assert!(report.contains("現在価格: ¥15,000 (-0.50%)"));
        assert!(report.contains("12ヶ月後"));
        assert!(report.contains("¥30,000 (+100.00%)"));
        assert!(report.contains("予測元: AI / 信頼度: 高"));
        assert!(report.contains("1. 新製品"));
        assert!(report.contains("(なし)"));
    }

    #[test]
    fn test_report_keeps_native_currency_without_rate() {
        let rates = ExchangeRates::new([("USD".to_string(), 1.0)].into_iter().collect());
        let report = render_outcome(&outcome(), &rates, "JPY").unwrap();

        assert!(report.contains("現在価格: $100.00"));
    }

    #[test]
    fn test_render_ready_view() {
        let rates = ExchangeRates::fallback();
        let view = SearchView::Ready(Box::new(outcome()));

        let out = render_view(&view, &rates, "USD").unwrap();
        assert_eq!(out, render_outcome(&outcome(), &rates, "USD").unwrap());
        assert!(out.contains("【最新ニュース】"));
    }

    #[test]
    fn test_render_failed_view() {
        let view = SearchView::Failed("見つかりませんでした".to_string());
        let out = render_view(&view, &ExchangeRates::fallback(), "JPY").unwrap();
        assert_eq!(out, "⚠️ 見つかりませんでした\n");
    }

    #[test]
    fn test_render_rates_and_matches() {
        let rates = render_rates(&ExchangeRates::fallback(), &["JPY", "CHF"]).unwrap();
        assert!(rates.contains("JPY 150.0000"));
        assert!(rates.contains("CHF -"));

        let matches = render_matches(&[StockMatch {
            symbol: "7203.T".to_string(),
            name: "トヨタ自動車".to_string(),
            sector: Some("輸送用機器".to_string()),
            market: Some("プライム".to_string()),
        }])
        .unwrap();
        assert!(matches.contains("7203.T   トヨタ自動車 (輸送用機器, プライム)"));
        assert_eq!(render_matches(&[]).unwrap(), "該当する銘柄はありません\n");
    }

    #[test]
    fn test_render_top_in_yen() {
        let markets = vec![CryptoMarket {
            id: "bitcoin".to_string(),
            symbol: "btc".to_string(),
            name: "Bitcoin".to_string(),
            current_price: 100.0,
            price_change_percentage_24h: Some(2.0),
            market_cap: None,
            total_volume: None,
        }];
        let out = render_top(&markets, &ExchangeRates::fallback(), "JPY").unwrap();

        assert!(out.starts_with(" 1. BTC"));
        assert!(out.contains("¥15,000"));
        assert!(out.contains("+2.00%"));
        assert!(out.contains("時価総額 データ不足"));
    }

    #[test]
    fn test_render_headlines_hides_placeholder_urls() {
        let articles = crate::data::news::canned_news("Markets");
        let out = render_headlines(&articles).unwrap();

        assert_eq!(out.lines().count(), 10);
        assert!(!out.contains(" #"));
    }
}
