//! NewsAPI tier: primary news source with plain credential rotation.
//!
//! NewsAPI keys carry no local usage counters; a key is rotated out the
//! moment the provider answers 429. When a full rotation round yields
//! nothing but 429s, the adapter sleeps one backoff step and starts the
//! round over, up to the retry budget.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use crate::fetch::providers::{build_http_client, ApiReply, SearchApi};
use crate::fetch::{Article, ArticleSource, SourceFetch};
use crate::ratelimit::{Backoff, RetryConfig};

const ENDPOINT: &str = "https://newsapi.org/v2/everything";

/// Articles older than this many days are not requested.
const LOOKBACK_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    source: Option<RawSource>,
    title: Option<String>,
    description: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

fn normalize(body: NewsApiResponse, limit: usize) -> Vec<Article> {
    body.articles
        .into_iter()
        .filter_map(|raw| {
            let title = raw.title.unwrap_or_default();
            if title.is_empty() {
                return None;
            }
            let source = raw
                .source
                .and_then(|s| s.name)
                .unwrap_or_else(|| "Unknown Source".to_string());
            Some(Article::new(
                source,
                title,
                raw.description.unwrap_or_default(),
                raw.published_at.unwrap_or_default(),
            ))
        })
        .take(limit)
        .collect()
}

/// Real HTTP implementation of the NewsAPI search call.
pub struct HttpNewsApi {
    http: reqwest::Client,
}

impl HttpNewsApi {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: build_http_client(timeout),
        }
    }
}

#[async_trait]
impl SearchApi for HttpNewsApi {
    async fn search(&self, key: &str, query: &str, limit: usize) -> ApiReply {
        let from = (chrono::Utc::now() - chrono::Duration::days(LOOKBACK_DAYS))
            .format("%Y-%m-%d")
            .to_string();
        let resp = self
            .http
            .get(ENDPOINT)
            .query(&[
                ("q", query),
                ("apiKey", key),
                ("from", from.as_str()),
                ("sortBy", "publishedAt"),
                ("language", "en"),
                ("pageSize", limit.to_string().as_str()),
            ])
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => return ApiReply::Failed(e.into()),
        };
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return ApiReply::RateLimited;
        }
        if !resp.status().is_success() {
            return ApiReply::Failed(anyhow!("newsapi returned http {}", resp.status()));
        }
        match resp.json::<NewsApiResponse>().await {
            Ok(body) => ApiReply::Articles(normalize(body, limit)),
            Err(e) => ApiReply::Failed(e.into()),
        }
    }
}

/// Cascade tier over an ordered credential list.
pub struct NewsApiProvider<A: SearchApi> {
    api: A,
    keys: Vec<String>,
    retry: RetryConfig,
}

impl NewsApiProvider<HttpNewsApi> {
    pub fn over_http(keys: Vec<String>, timeout: Duration, retry: RetryConfig) -> Self {
        Self::new(HttpNewsApi::new(timeout), keys, retry)
    }
}

impl<A: SearchApi> NewsApiProvider<A> {
    pub fn new(api: A, keys: Vec<String>, retry: RetryConfig) -> Self {
        Self { api, keys, retry }
    }
}

#[async_trait]
impl<A: SearchApi> ArticleSource for NewsApiProvider<A> {
    async fn fetch(&self, query: &str, limit: usize) -> SourceFetch {
        if self.keys.is_empty() {
            tracing::debug!(provider = self.name(), "no credentials configured");
            return SourceFetch::Articles(Vec::new());
        }

        let mut backoff = Backoff::new(&self.retry);
        loop {
            for (slot, key) in self.keys.iter().enumerate() {
                match self.api.search(key, query, limit).await {
                    ApiReply::Articles(batch) => return SourceFetch::Articles(batch),
                    ApiReply::RateLimited => {
                        counter!("provider_rate_limited_total").increment(1);
                        tracing::warn!(
                            provider = self.name(),
                            slot,
                            "rate limited; rotating credential"
                        );
                    }
                    ApiReply::Failed(e) => {
                        counter!("provider_errors_total").increment(1);
                        tracing::warn!(error = ?e, provider = self.name(), "request failed");
                        // Transient failures are endpoint-wide; end the
                        // rotation round early and back off.
                        break;
                    }
                }
            }
            match backoff.next_delay() {
                Some(delay) => {
                    counter!("provider_retries_total").increment(1);
                    tracing::info!(
                        provider = self.name(),
                        delay_ms = delay.as_millis() as u64,
                        "backing off before next rotation round"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::warn!(provider = self.name(), "retry budget spent; failing soft");
                    return SourceFetch::Articles(Vec::new());
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "NewsAPI"
    }
}
