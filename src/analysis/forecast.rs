use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use crate::ai::gemini::CompletionProvider;
use crate::ai::prompt::{build_prompt, parse_answer, MonthlyTarget};
use crate::analysis::indicators::{IndicatorSnapshot, Sentiment};
use crate::data::types::{AssetKind, NewsArticle, PricePoint};
use crate::error::DataError;

pub const FORECAST_DAYS: usize = 365;
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

const GROWTH_WINDOW: usize = 30;
const DAMPING_FACTOR: f64 = 0.995;
/// Daily noise is uniform in `±NOISE_SPAN / 2`
const NOISE_SPAN: f64 = 0.015;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Confidence::High => "高",
            Confidence::Medium => "中",
            Confidence::Low => "低",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub title: String,
    pub reasoning: String,
}

impl Factor {
    pub fn new(title: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            reasoning: reasoning.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ForecastSource {
    Llm,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    pub predictions: Vec<PricePoint>,
    pub analysis: String,
    pub confidence: Confidence,
    pub key_factors: Vec<Factor>,
    pub risks: Vec<Factor>,
    pub source: ForecastSource,
}

/// Everything a forecast is built from
#[derive(Debug, Clone, Copy)]
pub struct ForecastInput<'a> {
    pub asset_name: &'a str,
    pub kind: AssetKind,
    pub currency: &'a str,
    /// Oldest first
    pub history: &'a [PricePoint],
    pub news: &'a [NewsArticle],
}

pub struct ForecastGenerator {
    provider: Option<Arc<dyn CompletionProvider>>,
}

impl ForecastGenerator {
    pub fn new(provider: Option<Arc<dyn CompletionProvider>>) -> Self {
        Self { provider }
    }

    /// Forecast from the language model, or the local trend model when the
    /// model is unavailable or its answer is unusable.
    ///
    /// Fails only when `history` is empty.
    pub async fn forecast(&self, input: &ForecastInput<'_>) -> Result<ForecastResult, DataError> {
        let name = input.asset_name;
        let no_history = || DataError::NotFound(format!("No price history for {}", name));
        let last = *input.history.last().ok_or_else(no_history)?;

        let prices: Vec<f64> = input.history.iter().map(|p| p.price).collect();
        let indicators = IndicatorSnapshot::compute(&prices);

        match &self.provider {
            Some(provider) => {
                let attempt = self
                    .model_forecast(provider.as_ref(), input, &indicators, last)
                    .await;
                match attempt {
                    Ok(result) => {
                        info!("Forecast for {} generated by {}", name, provider.name());
                        return Ok(result);
                    }
                    Err(e) => warn!("Model forecast failed for {}, using fallback: {}", name, e),
                }
            }
            None => warn!("No language model configured, using fallback forecast"),
        }

        generate_fallback(name, input.history, &indicators).ok_or_else(no_history)
    }

    async fn model_forecast(
        &self,
        provider: &dyn CompletionProvider,
        input: &ForecastInput<'_>,
        indicators: &IndicatorSnapshot,
        last: PricePoint,
    ) -> Result<ForecastResult, DataError> {
        let prompt = build_prompt(input, indicators);
        let text = provider.complete(&prompt).await?;
        let answer = parse_answer(&text)?;

        // Anything short of a full year is unusable
        let predictions = interpolate_monthly(&last, &answer.monthly);
        if predictions.len() != FORECAST_DAYS {
            return Err(DataError::Parse(format!(
                "Monthly predictions cover {} of {} days",
                predictions.len(),
                FORECAST_DAYS
            )));
        }

        Ok(ForecastResult {
            predictions,
            analysis: answer.analysis,
            confidence: answer.confidence,
            key_factors: answer.key_factors,
            risks: answer.risks,
            source: ForecastSource::Llm,
        })
    }
}

/// Day offset (from the last known point) at which month `m` is anchored
pub fn anchor_day(month: u32) -> usize {
    (f64::from(month) * FORECAST_DAYS as f64 / 12.0).round() as usize
}

/// Expand monthly targets into daily points by linear interpolation.
///
/// Starts from `last`; anchors beyond one year are ignored.
pub fn interpolate_monthly(last: &PricePoint, monthly: &[MonthlyTarget]) -> Vec<PricePoint> {
    let mut predictions = Vec::with_capacity(FORECAST_DAYS);
    let mut prev_day = 0usize;
    let mut prev_price = last.price;

    for target in monthly {
        let day = anchor_day(target.month);
        if day <= prev_day || day > FORECAST_DAYS {
            continue;
        }

        let span = day - prev_day;
        let step = (target.price - prev_price) / span as f64;
        for d in 1..=span {
            let offset = (prev_day + d) as i64;
            predictions.push(PricePoint::new(
                last.timestamp + offset * DAY_MS,
                prev_price + step * d as f64,
            ));
        }

        prev_day = day;
        prev_price = target.price;
    }

    predictions
}

/// Average daily growth over the last 30 points
fn recent_growth_rate(history: &[PricePoint]) -> f64 {
    let recent = &history[history.len().saturating_sub(GROWTH_WINDOW)..];
    match (recent.first(), recent.last()) {
        (Some(first), Some(last)) if first.price > 0.0 => {
            (last.price - first.price) / first.price / GROWTH_WINDOW as f64
        }
        _ => 0.0,
    }
}

/// Damped random walk, see [`generate_fallback_with_rng`]
pub fn generate_fallback(
    asset_name: &str,
    history: &[PricePoint],
    indicators: &IndicatorSnapshot,
) -> Option<ForecastResult> {
    generate_fallback_with_rng(asset_name, history, indicators, &mut rand::thread_rng())
}

/// One year of daily prices from a damped trend plus uniform noise.
///
/// Returns `None` only for an empty history.
pub fn generate_fallback_with_rng<R: Rng>(
    asset_name: &str,
    history: &[PricePoint],
    indicators: &IndicatorSnapshot,
    rng: &mut R,
) -> Option<ForecastResult> {
    let last = history.last()?;
    let avg_growth = recent_growth_rate(history);

    let mut growth = avg_growth;
    let mut price = last.price;
    let predictions = (1..=FORECAST_DAYS as i64)
        .map(|day| {
            growth *= DAMPING_FACTOR;
            let noise = (rng.gen::<f64>() - 0.5) * NOISE_SPAN;
            price = price * (1.0 + growth) * (1.0 + noise);
            PricePoint::new(last.timestamp + day * DAY_MS, price)
        })
        .collect();

    let sentiment = indicators.sentiment();

    Some(ForecastResult {
        predictions,
        analysis: fallback_analysis(asset_name, avg_growth, indicators, sentiment),
        confidence: Confidence::Medium,
        key_factors: fallback_factors(avg_growth, indicators, sentiment),
        risks: fallback_risks(indicators, sentiment),
        source: ForecastSource::Fallback,
    })
}

fn fmt_indicator(value: Option<f64>, suffix: &str) -> String {
    value
        .map(|v| format!("{:.2}{}", v, suffix))
        .unwrap_or_else(|| "データ不足".to_string())
}

fn fallback_analysis(
    asset_name: &str,
    avg_growth: f64,
    indicators: &IndicatorSnapshot,
    sentiment: Sentiment,
) -> String {
    let annualized = ((1.0 + avg_growth).powi(FORECAST_DAYS as i32) - 1.0) * 100.0;

    format!(
        "{name}の今後1年間の価格予測分析:

過去の価格データとテクニカル指標に基づく簡易トレンドモデルによる予測です。

【主要な分析ポイント】
1. トレンド分析: 過去30日間の平均成長率は{daily:.2}%/日です。この傾向が継続すると仮定した場合、年間で約{annual:.2}%の変動に相当しますが、予測では成長率を日々減衰させています。

2. テクニカル指標: RSI(14日)は{rsi}で、{label}の水準にあります。SMA(7日)は{sma7}、SMA(30日)は{sma30}です。

3. ボラティリティ: 過去30日間の変動率は{vol}です。短期的には日々±0.75%程度の揺らぎを想定しています。

【注意事項】
この予測は過去のデータとテクニカル分析に基づくものであり、投資アドバイスではありません。実際の市場は予測不可能な要因により大きく変動する可能性があります。投資判断は自己責任で行ってください。",
        name = asset_name,
        daily = avg_growth * 100.0,
        annual = annualized,
        rsi = fmt_indicator(indicators.rsi14, ""),
        label = sentiment.label(),
        sma7 = fmt_indicator(indicators.sma7, ""),
        sma30 = fmt_indicator(indicators.sma30, ""),
        vol = fmt_indicator(indicators.volatility30, "%"),
    )
}

fn fallback_factors(
    avg_growth: f64,
    indicators: &IndicatorSnapshot,
    sentiment: Sentiment,
) -> Vec<Factor> {
    let mut factors = Vec::with_capacity(4);

    factors.push(if avg_growth >= 0.0 {
        Factor::new(
            "過去30日間の上昇トレンド",
            format!(
                "直近30日間の平均成長率は{:.2}%/日で、短期的な上昇基調が続いています。予測ではこの勢いが徐々に落ち着くと仮定しています。",
                avg_growth * 100.0
            ),
        )
    } else {
        Factor::new(
            "下落トレンドからの反発余地",
            format!(
                "直近30日間の平均成長率は{:.2}%/日と下落基調ですが、下落の勢いは時間とともに弱まると仮定しています。",
                avg_growth * 100.0
            ),
        )
    });

    factors.push(match (indicators.sma7, indicators.sma30) {
        (Some(short), Some(long)) if short >= long => Factor::new(
            "短期移動平均が中期移動平均を上回る",
            format!("SMA(7日) {:.2} がSMA(30日) {:.2} を上回っており、短期的な買い圧力が優勢です。", short, long),
        ),
        (Some(short), Some(long)) => Factor::new(
            "短期移動平均が中期移動平均を下回る",
            format!("SMA(7日) {:.2} がSMA(30日) {:.2} を下回っており、上昇には短期的な売り圧力の解消が必要です。", short, long),
        ),
        _ => Factor::new(
            "移動平均のデータ不足",
            "移動平均の算出に必要な期間のデータが不足しているため、トレンド判断の確度は限定的です。",
        ),
    });

    factors.push(match sentiment {
        Sentiment::Overbought => Factor::new(
            "強い買い需要",
            format!("RSIが{}と買われすぎ水準にあり、足元の需要の強さを示しています。", fmt_indicator(indicators.rsi14, "")),
        ),
        Sentiment::Oversold => Factor::new(
            "売られすぎからの反発期待",
            format!("RSIが{}と売られすぎ水準にあり、自律反発の可能性があります。", fmt_indicator(indicators.rsi14, "")),
        ),
        Sentiment::Neutral => Factor::new(
            "テクニカル指標は中立圏",
            format!("RSIは{}で過熱感はなく、上値余地が残されています。", fmt_indicator(indicators.rsi14, "")),
        ),
    });

    factors.push(Factor::new(
        "市場全体のセンチメント",
        "関連セクターへの資金流入や投資家心理の改善が続けば、中長期的な価格の下支え要因となります。",
    ));

    factors
}

fn fallback_risks(indicators: &IndicatorSnapshot, sentiment: Sentiment) -> Vec<Factor> {
    let mut risks = Vec::with_capacity(4);

    risks.push(match sentiment {
        Sentiment::Overbought => Factor::new(
            "過熱感による調整リスク",
            "RSIが買われすぎ水準にあり、利益確定売りによる短期的な調整局面が訪れる可能性があります。",
        ),
        Sentiment::Oversold => Factor::new(
            "下落トレンド継続のリスク",
            "RSIが売られすぎ水準にあり、投資家心理の悪化が続けばさらなる下落もあり得ます。",
        ),
        Sentiment::Neutral => Factor::new(
            "方向感の欠如",
            "RSIが中立圏にあり明確なトレンドが出ていないため、材料次第でどちらにも振れる可能性があります。",
        ),
    });

    risks.push(match indicators.volatility30 {
        Some(vol) if vol > 10.0 => Factor::new(
            "高いボラティリティ",
            format!("30日間の変動率が{:.2}%と高く、予測から大きく乖離する価格変動が起こり得ます。", vol),
        ),
        Some(vol) => Factor::new(
            "ボラティリティの急変",
            format!("30日間の変動率は{:.2}%と落ち着いていますが、外部要因による急変には注意が必要です。", vol),
        ),
        None => Factor::new(
            "変動率の推定困難",
            "変動率の算出に必要なデータが不足しているため、価格変動の幅を見積もることができません。",
        ),
    });

    risks.push(Factor::new(
        "規制環境の変化による影響",
        "主要国における規制強化や税制改正の動きは、市場センチメントを冷やすリスク要因です。",
    ));

    risks.push(Factor::new(
        "マクロ経済の不確実性",
        "インフレ率の高止まりや金融引き締めは、リスク資産全般への逆風となります。",
    ));

    risks
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const START: i64 = 1_700_000_000_000;

    fn history(len: usize, start_price: f64, step: f64) -> Vec<PricePoint> {
        (0..len)
            .map(|i| PricePoint::new(START + i as i64 * DAY_MS, start_price + step * i as f64))
            .collect()
    }

    fn indicators_for(history: &[PricePoint]) -> IndicatorSnapshot {
        IndicatorSnapshot::compute(&history.iter().map(|p| p.price).collect::<Vec<_>>())
    }

    struct StubProvider {
        reply: Result<String, DataError>,
    }

    #[async_trait]
    impl CompletionProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, DataError> {
            self.reply.clone()
        }
    }

    fn generator(reply: Result<String, DataError>) -> ForecastGenerator {
        ForecastGenerator::new(Some(Arc::new(StubProvider { reply })))
    }

    fn input<'a>(history: &'a [PricePoint]) -> ForecastInput<'a> {
        ForecastInput {
            asset_name: "Bitcoin",
            kind: AssetKind::Crypto,
            currency: "USD",
            history,
            news: &[],
        }
    }

    fn assert_daily_from(predictions: &[PricePoint], last_ts: i64) {
        assert_eq!(predictions[0].timestamp, last_ts + DAY_MS);
        assert!(predictions.windows(2).all(|w| w[1].timestamp - w[0].timestamp == DAY_MS));
    }

    #[test]
    fn test_fallback_shape() {
        let history = history(60, 100.0, 1.0);
        let indicators = indicators_for(&history);
        let result = generate_fallback("Bitcoin", &history, &indicators).unwrap();

        assert_eq!(result.predictions.len(), FORECAST_DAYS);
        assert_daily_from(&result.predictions, history.last().unwrap().timestamp);
        assert!(result.predictions.iter().all(|p| p.price.is_finite() && p.price > 0.0));
        assert_eq!(result.confidence, Confidence::Medium);
        assert_eq!(result.source, ForecastSource::Fallback);
        assert_eq!(result.key_factors.len(), 4);
        assert_eq!(result.risks.len(), 4);
    }

    #[test]
    fn test_fallback_is_seed_deterministic() {
        let history = history(30, 50.0, 0.5);
        let indicators = indicators_for(&history);

        let run = |seed| {
            generate_fallback_with_rng("X", &history, &indicators, &mut StdRng::seed_from_u64(seed))
                .unwrap()
        };
        assert_eq!(run(7).predictions, run(7).predictions);
    }

    #[test]
    fn test_fallback_flat_history_stays_in_noise_band() {
        let history = history(30, 100.0, 0.0);
        let indicators = IndicatorSnapshot::compute(&[100.0; 30]);
        let mut rng = StdRng::seed_from_u64(1);
        let result = generate_fallback_with_rng("X", &history, &indicators, &mut rng).unwrap();

        // Zero growth: first step is pure noise within ±0.75%
        let first = result.predictions[0].price;
        assert!((99.25..=100.75).contains(&first));
    }

    #[test]
    fn test_fallback_single_point_and_empty() {
        let single = vec![PricePoint::new(START, 42.0)];
        let indicators = IndicatorSnapshot::compute(&[42.0]);

        let result = generate_fallback("X", &single, &indicators).unwrap();
        assert_eq!(result.predictions.len(), FORECAST_DAYS);
        assert!(result.analysis.contains("データ不足"));

        assert!(generate_fallback("X", &[], &indicators).is_none());
    }

    #[test]
    fn test_fallback_text_follows_rsi() {
        let rising = history(40, 100.0, 2.0);
        let indicators = indicators_for(&rising);
        let result = generate_fallback("X", &rising, &indicators).unwrap();

        assert!(result.analysis.contains("買われすぎ"));
        assert_eq!(result.risks[0].title, "過熱感による調整リスク");
        assert_eq!(result.key_factors[0].title, "過去30日間の上昇トレンド");
    }

    #[test]
    fn test_interpolate_twelve_months() {
        let last = PricePoint::new(START, 100.0);
        let monthly: Vec<MonthlyTarget> = (1..=12)
            .map(|month| MonthlyTarget { month, price: 100.0 + 10.0 * month as f64 })
            .collect();

        let predictions = interpolate_monthly(&last, &monthly);
        assert_eq!(predictions.len(), FORECAST_DAYS);
        assert_daily_from(&predictions, START);
        assert!((predictions[29].price - 110.0).abs() < 1e-9);
        assert!((predictions.last().unwrap().price - 220.0).abs() < 1e-9);
    }

    #[test]
    fn test_interpolate_skips_out_of_range() {
        let last = PricePoint::new(START, 100.0);
        let monthly = [
            MonthlyTarget { month: 1, price: 130.0 },
            MonthlyTarget { month: 13, price: 500.0 },
        ];

        let predictions = interpolate_monthly(&last, &monthly);
        assert_eq!(predictions.len(), 30);
        assert!((predictions[0].price - 101.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_falls_back_on_partial_year() {
        let reply = r#"{"monthlyPredictions": [
            {"month": 1, "predictedPrice": 150},
            {"month": 2, "predictedPrice": 160},
            {"month": 3, "predictedPrice": 170}
        ], "analysis": "短期のみ"}"#;

        let history = history(40, 100.0, 1.0);
        let result = generator(Ok(reply.to_string())).forecast(&input(&history)).await.unwrap();

        assert_eq!(result.source, ForecastSource::Fallback);
        assert_eq!(result.predictions.len(), FORECAST_DAYS);
        assert_ne!(result.analysis, "短期のみ");
    }

    #[tokio::test]
    async fn test_model_path() {
        let months: Vec<String> = (1..=12)
            .map(|m| format!(r#"{{"month": {}, "predictedPrice": {}}}"#, m, 140 + m))
            .collect();
        let reply = format!(
            "以下が予測です。\n{{\"monthlyPredictions\": [{}], \"analysis\": \"強気\", \"keyFactors\": [\"半減期\"], \"risks\": [], \"overallConfidence\": \"low\"}}",
            months.join(", ")
        );

        let history = history(45, 100.0, 1.0);
        let result = generator(Ok(reply)).forecast(&input(&history)).await.unwrap();

        assert_eq!(result.source, ForecastSource::Llm);
        assert_eq!(result.predictions.len(), FORECAST_DAYS);
        assert_daily_from(&result.predictions, history.last().unwrap().timestamp);
        assert!((result.predictions.last().unwrap().price - 152.0).abs() < 1e-9);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.analysis, "強気");
        assert_eq!(result.key_factors[0].title, "半減期");
    }

    #[tokio::test]
    async fn test_falls_back_on_prose_answer() {
        let history = history(45, 100.0, 1.0);
        let result = generator(Ok("Sorry, I can't forecast prices.".to_string()))
            .forecast(&input(&history))
            .await
            .unwrap();

        assert_eq!(result.source, ForecastSource::Fallback);
        assert_eq!(result.predictions.len(), FORECAST_DAYS);
    }

    #[tokio::test]
    async fn test_falls_back_on_provider_error() {
        let history = history(45, 100.0, 1.0);
        let result = generator(Err(DataError::Upstream("HTTP 429".to_string())))
            .forecast(&input(&history))
            .await
            .unwrap();

        assert_eq!(result.source, ForecastSource::Fallback);
    }

    #[tokio::test]
    async fn test_unconfigured_and_empty_history() {
        let generator = ForecastGenerator::new(None);
        let history = history(5, 10.0, 1.0);

        let result = generator.forecast(&input(&history)).await.unwrap();
        assert_eq!(result.source, ForecastSource::Fallback);

        assert!(matches!(
            generator.forecast(&input(&[])).await,
            Err(DataError::NotFound(_))
        ));
    }
}
