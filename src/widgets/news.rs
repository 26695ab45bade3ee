//! Headlines from an RSS feed, converted to JSON by rss2json.

use std::time::{Duration, Instant};

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::AppState;
use crate::config::WidgetsConfig;

pub const MAX_ITEMS: usize = 10;
pub const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    items: Vec<NewsItem>,
}

/// First [`MAX_ITEMS`] items of an rss2json response.
pub fn parse_feed(body: &str) -> anyhow::Result<Vec<NewsItem>> {
    let feed: FeedResponse = serde_json::from_str(body)?;
    if feed.status != "ok" {
        anyhow::bail!(
            "feed status {}: {}",
            feed.status,
            feed.message.unwrap_or_default()
        );
    }
    Ok(feed
        .items
        .into_iter()
        .filter(|i| !i.title.trim().is_empty())
        .take(MAX_ITEMS)
        .collect())
}

#[derive(Debug)]
pub struct NewsService {
    http: reqwest::Client,
    api_url: String,
    feed_url: String,
    ttl: Duration,
    cache: RwLock<Option<(Instant, Vec<NewsItem>)>>,
}

impl NewsService {
    pub fn new(config: &WidgetsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.news_api_url.clone(),
            feed_url: config.news_feed_url.clone(),
            ttl: CACHE_TTL,
            cache: RwLock::new(None),
        }
    }

    /// Seed the cache, e.g. for tests or offline demos.
    pub async fn prime(&self, items: Vec<NewsItem>) {
        *self.cache.write().await = Some((Instant::now(), items));
    }

    /// Cached headlines, refreshed once the cache is older than the TTL.
    pub async fn headlines(&self) -> anyhow::Result<Vec<NewsItem>> {
        if let Some((at, items)) = self.cache.read().await.as_ref()
            && at.elapsed() < self.ttl
        {
            return Ok(items.clone());
        }

        let body = self
            .http
            .get(&self.api_url)
            .query(&[("rss_url", self.feed_url.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let items = parse_feed(&body)?;

        tracing::debug!(name: "news.refreshed", count = items.len(), "News cache refreshed");
        *self.cache.write().await = Some((Instant::now(), items.clone()));
        Ok(items)
    }
}

#[derive(Debug, Serialize)]
pub struct NewsResponse {
    pub news: Vec<NewsItem>,
}

/// GET /get_news
pub async fn get_news(State(state): State<AppState>) -> Json<NewsResponse> {
    let news = state.news.headlines().await.unwrap_or_else(|e| {
        tracing::warn!(name: "news.failed", error = %e, "News fetch failed");
        Vec::new()
    });
    Json(NewsResponse { news })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_parse_feed_limits_items() {
        let items: Vec<serde_json::Value> = (0..15)
            .map(|i| serde_json::json!({"title": format!("見出し{i}"), "link": format!("https://n.example/{i}"), "pubDate": "x"}))
            .collect();
        let body = serde_json::json!({"status": "ok", "items": items}).to_string();

        let parsed = parse_feed(&body).unwrap();
        assert_eq!(parsed.len(), MAX_ITEMS);
        assert_eq!(parsed[0].title, "見出し0");
    }

    #[test]
    fn test_parse_feed_error_status() {
        let err = parse_feed(r#"{"status":"error","message":"rss_url invalid"}"#).unwrap_err();
        assert!(err.to_string().contains("rss_url invalid"));
    }

    #[tokio::test]
    async fn test_primed_cache_is_served() {
        let config = AppConfig::defaults().unwrap();
        let service = NewsService::new(&config.widgets);
        let item = NewsItem {
            title: "t".to_string(),
            link: "l".to_string(),
        };
        service.prime(vec![item.clone()]).await;
        assert_eq!(service.headlines().await.unwrap(), vec![item]);
    }
}
