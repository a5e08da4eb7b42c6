//! Reddit hot-post source.
//!
//! Polls `/r/{sub}/hot.json` for each configured subreddit. Stickied and
//! NSFW posts never become topics. A failing subreddit is logged and
//! skipped; the provider keeps whatever the other subreddits produced.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use crate::fetch::providers::build_http_client;
use crate::trends::{normalize_topic, TrendCandidate, TrendProvider, TrendSource};

const BASE: &str = "https://www.reddit.com";

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    title: String,
    #[serde(default)]
    stickied: bool,
    #[serde(default)]
    over_18: bool,
}

fn parse_hot_titles(body: &str, subreddit: &str, per_subreddit: usize) -> Result<Vec<TrendCandidate>> {
    let listing: Listing = serde_json::from_str(body).context("parsing reddit listing")?;
    let mut out = Vec::new();
    for child in listing.data.children {
        if out.len() >= per_subreddit {
            break;
        }
        let post = child.data;
        if post.stickied || post.over_18 {
            continue;
        }
        let topic = normalize_topic(&post.title);
        if topic.is_empty() {
            continue;
        }
        out.push(TrendCandidate {
            topic,
            source: TrendSource::Reddit,
            related_queries: Vec::new(),
            category: Some(subreddit.to_string()),
        });
    }
    Ok(out)
}

pub struct RedditTrendsProvider {
    http: reqwest::Client,
    subreddits: Vec<String>,
    per_subreddit: usize,
}

impl RedditTrendsProvider {
    pub fn new(subreddits: Vec<String>, per_subreddit: usize, timeout: Duration) -> Self {
        Self {
            http: build_http_client(timeout),
            subreddits,
            per_subreddit,
        }
    }

    async fn fetch_subreddit(&self, subreddit: &str) -> Result<Vec<TrendCandidate>> {
        let url = format!("{BASE}/r/{subreddit}/hot.json");
        let body = self
            .http
            .get(&url)
            .query(&[("limit", (self.per_subreddit + 5).to_string().as_str())])
            .send()
            .await
            .context("reddit get()")?
            .error_for_status()
            .context("reddit status")?
            .text()
            .await
            .context("reddit .text()")?;
        parse_hot_titles(&body, subreddit, self.per_subreddit)
    }
}

#[async_trait]
impl TrendProvider for RedditTrendsProvider {
    async fn fetch_trends(&self) -> Result<Vec<TrendCandidate>> {
        let mut out = Vec::new();
        for subreddit in &self.subreddits {
            match self.fetch_subreddit(subreddit).await {
                Ok(mut candidates) => out.append(&mut candidates),
                Err(e) => {
                    tracing::warn!(error = ?e, subreddit, "subreddit poll failed");
                    counter!("trend_source_errors_total").increment(1);
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "Reddit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stickied_and_nsfw_posts_are_skipped() {
        let body = include_str!("../../../tests/fixtures/reddit_hot.json");
        let got = parse_hot_titles(body, "technology", 10).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].topic, "Chipmaker unveils 2nm fab roadmap");
        assert_eq!(got[0].category.as_deref(), Some("technology"));
    }

    #[test]
    fn per_subreddit_cap_applies_after_filtering() {
        let body = include_str!("../../../tests/fixtures/reddit_hot.json");
        let got = parse_hot_titles(body, "technology", 1).unwrap();
        assert_eq!(got.len(), 1);
    }
}
