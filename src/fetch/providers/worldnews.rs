//! World News API tier: single-credential last resort.
//!
//! One key, no rotation. Both 429 and transient failures burn the same
//! bounded backoff budget, after which the tier fails soft.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use crate::fetch::providers::{build_http_client, ApiReply, SearchApi};
use crate::fetch::{Article, ArticleSource, SourceFetch};
use crate::ratelimit::{Backoff, RetryConfig};

const ENDPOINT: &str = "https://api.worldnewsapi.com/search-news";

/// Source label for records from this tier; the upstream body carries
/// no per-article source name.
const SOURCE_LABEL: &str = "World News";

#[derive(Debug, Deserialize)]
struct WorldNewsResponse {
    #[serde(default)]
    news: Vec<RawNews>,
}

#[derive(Debug, Deserialize)]
struct RawNews {
    title: Option<String>,
    text: Option<String>,
    publish_date: Option<String>,
}

fn normalize(body: WorldNewsResponse, limit: usize) -> Vec<Article> {
    body.news
        .into_iter()
        .filter_map(|raw| {
            let title = raw.title.unwrap_or_default();
            if title.is_empty() {
                return None;
            }
            Some(Article::new(
                SOURCE_LABEL,
                title,
                raw.text.unwrap_or_default(),
                raw.publish_date.unwrap_or_default(),
            ))
        })
        .take(limit)
        .collect()
}

/// Real HTTP implementation of the World News search call.
pub struct HttpWorldNews {
    http: reqwest::Client,
}

impl HttpWorldNews {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: build_http_client(timeout),
        }
    }
}

#[async_trait]
impl SearchApi for HttpWorldNews {
    async fn search(&self, key: &str, query: &str, limit: usize) -> ApiReply {
        let resp = self
            .http
            .get(ENDPOINT)
            .query(&[
                ("api-key", key),
                ("text", query),
                ("language", "en"),
                ("number", limit.to_string().as_str()),
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
            return ApiReply::Failed(anyhow!("worldnews returned http {}", resp.status()));
        }
        match resp.json::<WorldNewsResponse>().await {
            Ok(body) => ApiReply::Articles(normalize(body, limit)),
            Err(e) => ApiReply::Failed(e.into()),
        }
    }
}

/// Final cascade tier with a single optional credential.
pub struct WorldNewsProvider<A: SearchApi> {
    api: A,
    key: Option<String>,
    retry: RetryConfig,
}

impl WorldNewsProvider<HttpWorldNews> {
    pub fn over_http(key: Option<String>, timeout: Duration, retry: RetryConfig) -> Self {
        Self::new(HttpWorldNews::new(timeout), key, retry)
    }
}

impl<A: SearchApi> WorldNewsProvider<A> {
    pub fn new(api: A, key: Option<String>, retry: RetryConfig) -> Self {
        Self { api, key, retry }
    }
}

#[async_trait]
impl<A: SearchApi> ArticleSource for WorldNewsProvider<A> {
    async fn fetch(&self, query: &str, limit: usize) -> SourceFetch {
        let Some(key) = self.key.as_deref() else {
            tracing::debug!(provider = self.name(), "no credential configured");
            return SourceFetch::Articles(Vec::new());
        };

        let mut backoff = Backoff::new(&self.retry);
        loop {
            match self.api.search(key, query, limit).await {
                ApiReply::Articles(batch) => return SourceFetch::Articles(batch),
                ApiReply::RateLimited => {
                    counter!("provider_rate_limited_total").increment(1);
                    tracing::warn!(provider = self.name(), "rate limited");
                }
                ApiReply::Failed(e) => {
                    counter!("provider_errors_total").increment(1);
                    tracing::warn!(error = ?e, provider = self.name(), "request failed");
                }
            }
            match backoff.next_delay() {
                Some(delay) => {
                    counter!("provider_retries_total").increment(1);
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
        "World News API"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::DESCRIPTION_CAP;

    #[test]
    fn long_text_is_clipped_to_description_cap() {
        let body: WorldNewsResponse =
            serde_json::from_str(include_str!("../../../tests/fixtures/worldnews.json")).unwrap();
        let articles = normalize(body, 10);
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].source_name, SOURCE_LABEL);
        assert!(articles[1].description.chars().count() <= DESCRIPTION_CAP);
    }
}
