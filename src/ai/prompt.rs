//! Forecast prompt construction and tolerant parsing of the model's answer.

use serde::Deserialize;
use serde_json::Value;
use crate::ai::extract::extract_json;
use crate::analysis::forecast::{Confidence, Factor, ForecastInput};
use crate::analysis::indicators::IndicatorSnapshot;
use crate::data::types::AssetKind;
use crate::error::DataError;

const RECENT_PRICES: usize = 30;
const NEWS_SNIPPETS: usize = 5;
const MISSING: &str = "データ不足";
const MISSING_ANALYSIS: &str = "AI分析を生成できませんでした";
const GENERIC_REASONING: &str =
    "AIによる詳細な分析データが含まれていませんが、この要因は現在の市場トレンドにおいて重要です。";

/// Monthly price target returned by the model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthlyTarget {
    pub month: u32,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelAnswer {
    pub monthly: Vec<MonthlyTarget>,
    pub analysis: String,
    pub key_factors: Vec<Factor>,
    pub risks: Vec<Factor>,
    pub confidence: Confidence,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFactor {
    Text(String),
    Detailed {
        title: String,
        #[serde(default)]
        reasoning: Option<String>,
    },
}

fn fmt_value(value: Option<f64>, prefix: &str, suffix: &str) -> String {
    match value {
        Some(v) => format!("{}{:.2}{}", prefix, v, suffix),
        None => MISSING.to_string(),
    }
}

pub fn build_prompt(input: &ForecastInput<'_>, indicators: &IndicatorSnapshot) -> String {
    let history = input.history;
    let current = history.last().map(|p| p.price).unwrap_or_default();
    let first = history.first().map(|p| p.price).unwrap_or_default();
    let change_pct = if first != 0.0 {
        (current - first) / first * 100.0
    } else {
        0.0
    };

    let kind = match input.kind {
        AssetKind::Crypto => "仮想通貨",
        AssetKind::Stock => "株式",
    };
    let unit = format!("{} ", input.currency);

    let recent = history[history.len().saturating_sub(RECENT_PRICES)..]
        .iter()
        .map(|p| format!("{:.2}", p.price))
        .collect::<Vec<_>>()
        .join(", ");

    let news = input.news
        .iter()
        .take(NEWS_SNIPPETS)
        .map(|article| format!("- {}: {}", article.title, article.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"あなたは金融アナリストAIです。以下の情報を基に、{name}の今後1年間の価格予測を行ってください。

【資産情報】
- 資産名: {name}
- 資産タイプ: {kind}
- 現在価格: {unit}{current:.2}
- 過去1年間の変動: {change_pct:.2}%

【テクニカル分析指標】
- RSI (14日): {rsi} (70以上:買われすぎ / 30以下:売られすぎ)
- SMA (7日): {sma7}
- SMA (30日): {sma30}
- Volatility (30日): {volatility}

【過去30日間の価格トレンド】
{recent}

【最新ニュース】
{news}

以下の形式でJSON形式で回答してください:

{{
  "monthlyPredictions": [
    {{"month": 1, "predictedPrice": 価格, "confidence": "high/medium/low"}},
    ... (12ヶ月分)
  ],
  "analysis": "詳細な分析レポート（日本語、500文字程度）",
  "keyFactors": [
    {{ "title": "主要な成長要因タイトル", "reasoning": "その要因がなぜ成長に寄与するかの詳細な考察（200文字程度）" }}
  ],
  "risks": [
    {{ "title": "潜在的リスクタイトル", "reasoning": "そのリスクの影響と対策についての詳細な考察（200文字程度）" }}
  ],
  "overallConfidence": "high/medium/low"
}}

注意:
- 予測は現実的な範囲内で行ってください
- 分析には具体的なエビデンスを含めてください
- リスクと機会の両面を考慮してください
- これは投資アドバイスではないことを明記してください"#,
        name = input.asset_name,
        kind = kind,
        unit = unit,
        current = current,
        change_pct = change_pct,
        rsi = fmt_value(indicators.rsi14, "", ""),
        sma7 = fmt_value(indicators.sma7, &unit, ""),
        sma30 = fmt_value(indicators.sma30, &unit, ""),
        volatility = fmt_value(indicators.volatility30, "", "%"),
        recent = recent,
        news = news,
    )
}

fn parse_factors(value: Option<&Value>) -> Vec<Factor> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| serde_json::from_value::<RawFactor>(item.clone()).ok())
        .map(|raw| match raw {
            RawFactor::Text(title) => Factor::new(title, GENERIC_REASONING),
            RawFactor::Detailed { title, reasoning } => Factor::new(
                title,
                reasoning.unwrap_or_else(|| GENERIC_REASONING.to_string()),
            ),
        })
        .collect()
}

/// Month index as an integer; integral floats such as `1.0` count too
fn month_number(value: &Value) -> Option<u32> {
    if let Some(month) = value.as_u64() {
        return u32::try_from(month).ok();
    }
    let month = value.as_f64()?;
    let integral = month.fract() == 0.0 && (1.0..=f64::from(u32::MAX)).contains(&month);
    integral.then_some(month as u32)
}

fn parse_monthly(value: Option<&Value>) -> Vec<MonthlyTarget> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    let mut monthly: Vec<MonthlyTarget> = items
        .iter()
        .filter_map(|item| {
            let month = month_number(item.get("month")?)?;
            let price = item.get("predictedPrice")?.as_f64()?;
            (month >= 1 && price.is_finite() && price > 0.0)
                .then_some(MonthlyTarget { month, price })
        })
        .collect();

    monthly.sort_by_key(|target| target.month);
    monthly.dedup_by_key(|target| target.month);
    monthly
}

/// Parse the model's free-form answer into a forecast skeleton
pub fn parse_answer(text: &str) -> Result<ModelAnswer, DataError> {
    let json = extract_json(text)
        .ok_or_else(|| DataError::Parse("No JSON object in model response".to_string()))?;

    let monthly = parse_monthly(json.get("monthlyPredictions"));
    if monthly.is_empty() {
        return Err(DataError::Parse("Model response has no monthly predictions".to_string()));
    }

    let analysis = json
        .get("analysis")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(MISSING_ANALYSIS)
        .to_string();

    let confidence = json
        .get("overallConfidence")
        .and_then(Value::as_str)
        .and_then(Confidence::parse)
        .unwrap_or(Confidence::Medium);

    Ok(ModelAnswer {
        monthly,
        analysis,
        key_factors: parse_factors(json.get("keyFactors")),
        risks: parse_factors(json.get("risks")),
        confidence,
    })
}
