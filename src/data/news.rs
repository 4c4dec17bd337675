use chrono::{Duration, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;
use crate::data::types::NewsArticle;
use crate::error::DataError;

pub struct NewsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    source: Option<NewsApiSource>,
    #[serde(default)]
    url_to_image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    #[serde(default)]
    name: Option<String>,
}

impl From<NewsApiArticle> for NewsArticle {
    fn from(article: NewsApiArticle) -> Self {
        NewsArticle {
            title: article.title.unwrap_or_default(),
            description: article.description.unwrap_or_default(),
            url: article.url.unwrap_or_default(),
            published_at: article.published_at.unwrap_or_default(),
            source: article.source.and_then(|s| s.name).unwrap_or_default(),
            url_to_image: article.url_to_image,
        }
    }
}

impl NewsClient {
    pub fn new(client: Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    /// Latest English articles about `query`; canned articles without a key or on failure
    pub async fn fetch_asset_news(&self, query: &str, page_size: u32) -> Vec<NewsArticle> {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("News API key not set, using canned articles");
            return canned_news(query);
        };

        let url = format!("{}/everything", self.base_url);
        let page_size = page_size.to_string();
        let params = [
            ("q", query),
            ("apiKey", api_key),
            ("language", "en"),
            ("sortBy", "publishedAt"),
            ("pageSize", page_size.as_str()),
        ];

        match self.fetch(&url, &params).await {
            Ok(articles) => articles,
            Err(e) => {
                warn!("News fetch failed for {}: {}", query, e);
                canned_news(query)
            }
        }
    }

    /// General business headlines
    pub async fn fetch_headlines(&self, page_size: u32) -> Vec<NewsArticle> {
        let Some(api_key) = self.api_key.as_deref() else {
            return canned_news("cryptocurrency market");
        };

        let url = format!("{}/top-headlines", self.base_url);
        let page_size = page_size.to_string();
        let params = [
            ("category", "business"),
            ("apiKey", api_key),
            ("language", "en"),
            ("pageSize", page_size.as_str()),
        ];

        match self.fetch(&url, &params).await {
            Ok(articles) => articles,
            Err(e) => {
                warn!("Headline fetch failed: {}", e);
                canned_news("finance")
            }
        }
    }

    async fn fetch(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<NewsArticle>, DataError> {
        let response: NewsApiResponse = self.client
            .get(url)
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.articles.into_iter().map(NewsArticle::from).collect())
    }
}

/// Five generic articles mentioning `query`, newest first
pub fn canned_news(query: &str) -> Vec<NewsArticle> {
    let now = Utc::now();
    let templates = [
        (
            format!("{} Reaches New Milestone in Market Performance", query),
            format!("Recent analysis shows {} demonstrating strong market fundamentals with increased institutional adoption and positive technical indicators.", query),
            "Financial Times",
            2,
        ),
        (
            format!("Analysts Predict Bullish Trend for {}", query),
            format!("Market experts suggest that {} could see significant growth in the coming months based on current market conditions and adoption rates.", query),
            "Bloomberg",
            5,
        ),
        (
            format!("{} Technical Analysis: Key Support and Resistance Levels", query),
            format!("Technical analysts identify critical price levels for {}, with strong support zones and potential breakout patterns emerging.", query),
            "CoinDesk",
            12,
        ),
        (
            format!("Market Update: {} Shows Resilience Amid Volatility", query),
            format!("Despite recent market turbulence, {} maintains stable performance with growing trading volumes and investor confidence.", query),
            "Reuters",
            24,
        ),
        (
            format!("Institutional Interest in {} Continues to Grow", query),
            format!("Major financial institutions are increasing their exposure to {}, signaling long-term confidence in the asset's potential.", query),
            "Wall Street Journal",
            36,
        ),
    ];

    templates
        .into_iter()
        .map(|(title, description, source, hours_ago)| NewsArticle {
            title,
            description,
            url: "#".to_string(),
            published_at: (now - Duration::hours(hours_ago))
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            source: source.to_string(),
            url_to_image: None,
        })
        .collect()
}
