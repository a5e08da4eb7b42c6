// src/fetch/providers/mod.rs
pub mod newsapi;
pub mod serpapi;
pub mod worldnews;

use std::time::Duration;

use async_trait::async_trait;

use crate::fetch::Article;

/// User agent sent on every outbound provider call.
pub const USER_AGENT: &str = "trend-content-engine/0.1 (+github.com/trendwire/trend-content-engine)";

/// Reply from a single outbound search call with a single credential.
#[derive(Debug)]
pub enum ApiReply {
    /// 2xx with a parsed body; may be empty when the provider has no
    /// coverage for the query.
    Articles(Vec<Article>),
    /// HTTP 429; the credential is over quota upstream.
    RateLimited,
    /// Transport, non-429 status, or parse failure.
    Failed(anyhow::Error),
}

/// Low-level search call: one HTTP request with one credential.
/// Separated from the adapters so rotation and backoff can run against
/// scripted replies in tests.
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(&self, key: &str, query: &str, limit: usize) -> ApiReply;
}

/// Shared client for the HTTP-backed providers.
pub(crate) fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(4))
        .timeout(timeout)
        .build()
        .expect("reqwest client")
}
