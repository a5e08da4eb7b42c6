//! # Image Search
//! Optional hero-image lookup via Google Custom Search. A missing
//! credential pair or any upstream error just means no image; articles
//! are stored either way.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::fetch::providers::build_http_client;

const ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// First matching image URL, if any.
    async fn search_image(&self, query: &str) -> Option<String>;
}

/// Google Custom Search, image mode, safe search on.
pub struct GoogleImageSearch {
    http: reqwest::Client,
    api_key: String,
    cse_id: String,
}

impl GoogleImageSearch {
    pub fn new(api_key: String, cse_id: String, timeout: Duration) -> Self {
        Self {
            http: build_http_client(timeout),
            api_key,
            cse_id: cse_id.trim().to_string(),
        }
    }
}

#[async_trait]
impl ImageSearch for GoogleImageSearch {
    async fn search_image(&self, query: &str) -> Option<String> {
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            items: Vec<Item>,
        }
        #[derive(Deserialize)]
        struct Item {
            link: Option<String>,
        }

        let resp = self
            .http
            .get(ENDPOINT)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", query),
                ("searchType", "image"),
                ("num", "1"),
                ("safe", "active"),
            ])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "image search returned non-success");
            return None;
        }
        let body: Resp = resp.json().await.ok()?;
        body.items.into_iter().next().and_then(|i| i.link)
    }
}

/// Returns `None` always; used when image search is unconfigured.
pub struct NoImageSearch;

#[async_trait]
impl ImageSearch for NoImageSearch {
    async fn search_image(&self, _query: &str) -> Option<String> {
        None
    }
}
