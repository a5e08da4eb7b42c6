//! SerpAPI Google News tier: quota-tracked credential pool.
//!
//! Unlike NewsAPI, SerpAPI calls are metered locally through a
//! [`KeyPool`]: the adapter leases a credential before every call and
//! records usage only on success. A drained pool surfaces as
//! [`SourceFetch::Exhausted`] so the cascade moves on instead of
//! waiting for the window to roll over.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use crate::fetch::providers::{build_http_client, ApiReply, SearchApi};
use crate::fetch::{Article, ArticleSource, SourceFetch};
use crate::ratelimit::{Backoff, KeyPool, RetryConfig};

const ENDPOINT: &str = "https://serpapi.com/search.json";

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    news_results: Vec<RawNews>,
}

#[derive(Debug, Deserialize)]
struct RawNews {
    source: Option<RawSource>,
    title: Option<String>,
    snippet: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    title: Option<String>,
}

fn normalize(body: SerpApiResponse, limit: usize) -> Vec<Article> {
    body.news_results
        .into_iter()
        .filter_map(|raw| {
            let title = raw.title.unwrap_or_default();
            if title.is_empty() {
                return None;
            }
            let source = raw
                .source
                .and_then(|s| s.title)
                .unwrap_or_else(|| "Unknown Source".to_string());
            Some(Article::new(
                source,
                title,
                raw.snippet.unwrap_or_default(),
                raw.date.unwrap_or_default(),
            ))
        })
        .take(limit)
        .collect()
}

/// Real HTTP implementation of the SerpAPI google_news engine call.
pub struct HttpSerpApi {
    http: reqwest::Client,
}

impl HttpSerpApi {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: build_http_client(timeout),
        }
    }
}

#[async_trait]
impl SearchApi for HttpSerpApi {
    async fn search(&self, key: &str, query: &str, limit: usize) -> ApiReply {
        let resp = self
            .http
            .get(ENDPOINT)
            .query(&[
                ("engine", "google_news"),
                ("q", query),
                ("api_key", key),
                ("num", limit.to_string().as_str()),
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
            return ApiReply::Failed(anyhow!("serpapi returned http {}", resp.status()));
        }
        match resp.json::<SerpApiResponse>().await {
            Ok(body) => ApiReply::Articles(normalize(body, limit)),
            Err(e) => ApiReply::Failed(e.into()),
        }
    }
}

/// Cascade tier that leases credentials from a shared [`KeyPool`].
pub struct SerpApiProvider<A: SearchApi> {
    api: A,
    pool: Arc<KeyPool>,
    retry: RetryConfig,
}

impl SerpApiProvider<HttpSerpApi> {
    pub fn over_http(pool: Arc<KeyPool>, timeout: Duration, retry: RetryConfig) -> Self {
        Self::new(HttpSerpApi::new(timeout), pool, retry)
    }
}

impl<A: SearchApi> SerpApiProvider<A> {
    pub fn new(api: A, pool: Arc<KeyPool>, retry: RetryConfig) -> Self {
        Self { api, pool, retry }
    }
}

#[async_trait]
impl<A: SearchApi> ArticleSource for SerpApiProvider<A> {
    async fn fetch(&self, query: &str, limit: usize) -> SourceFetch {
        let mut backoff = Backoff::new(&self.retry);
        loop {
            let Some(lease) = self.pool.acquire().await else {
                tracing::warn!(provider = self.name(), "all credentials at quota cap");
                return SourceFetch::Exhausted;
            };
            match self.api.search(&lease.key, query, limit).await {
                ApiReply::Articles(batch) => {
                    // Usage counts only for calls that reached the
                    // provider and came back successful.
                    self.pool.record_use(lease.index);
                    return SourceFetch::Articles(batch);
                }
                ApiReply::RateLimited => {
                    counter!("provider_rate_limited_total").increment(1);
                    tracing::warn!(
                        provider = self.name(),
                        slot = lease.index,
                        "rate limited upstream despite local quota"
                    );
                }
                ApiReply::Failed(e) => {
                    counter!("provider_errors_total").increment(1);
                    tracing::warn!(error = ?e, provider = self.name(), "request failed");
                }
            }
            match backoff.next_delay() {
                Some(delay) => {
                    counter!("provider_retries_total").increment(1);
                    tracing::info!(
                        provider = self.name(),
                        delay_ms = delay.as_millis() as u64,
                        "backing off before re-leasing a credential"
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
        "SerpAPI"
    }
}
