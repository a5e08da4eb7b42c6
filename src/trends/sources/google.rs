//! Google daily trends source.
//!
//! The dailytrends endpoint serves JSON behind an anti-XSSI prefix
//! (`)]}',`) that must be stripped before parsing. Only the most recent
//! day of trending searches is used.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::fetch::providers::build_http_client;
use crate::trends::{normalize_topic, TrendCandidate, TrendProvider, TrendSource};

const ENDPOINT: &str = "https://trends.google.com/trends/api/dailytrends";

#[derive(Debug, Deserialize)]
struct DailyTrends {
    #[serde(rename = "default")]
    body: DefaultBlock,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefaultBlock {
    trending_searches_days: Vec<TrendingDay>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrendingDay {
    #[serde(default)]
    trending_searches: Vec<TrendingSearch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrendingSearch {
    title: SearchTitle,
    #[serde(default)]
    related_queries: Vec<RelatedQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchTitle {
    query: String,
}

#[derive(Debug, Deserialize)]
struct RelatedQuery {
    query: String,
}

/// Drop everything before the first `{`; the endpoint prepends `)]}',`.
fn strip_antixssi_prefix(body: &str) -> &str {
    match body.find('{') {
        Some(idx) => &body[idx..],
        None => "",
    }
}

fn parse_daily_trends(body: &str, per_poll: usize) -> Result<Vec<TrendCandidate>> {
    let json = strip_antixssi_prefix(body);
    if json.is_empty() {
        return Err(anyhow!("daily trends body carried no json object"));
    }
    let parsed: DailyTrends = serde_json::from_str(json).context("parsing daily trends json")?;

    let Some(day) = parsed.body.trending_searches_days.into_iter().next() else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for search in day.trending_searches.into_iter().take(per_poll) {
        let topic = normalize_topic(&search.title.query);
        if topic.is_empty() {
            continue;
        }
        let related = search
            .related_queries
            .into_iter()
            .map(|r| r.query.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        out.push(TrendCandidate {
            topic,
            source: TrendSource::Google,
            related_queries: related,
            category: None,
        });
    }
    Ok(out)
}

pub struct GoogleTrendsProvider {
    http: reqwest::Client,
    geo: String,
    per_poll: usize,
}

impl GoogleTrendsProvider {
    pub fn new(geo: impl Into<String>, per_poll: usize, timeout: Duration) -> Self {
        Self {
            http: build_http_client(timeout),
            geo: geo.into(),
            per_poll,
        }
    }
}

#[async_trait]
impl TrendProvider for GoogleTrendsProvider {
    async fn fetch_trends(&self) -> Result<Vec<TrendCandidate>> {
        let body = self
            .http
            .get(ENDPOINT)
            .query(&[
                ("hl", "en-US"),
                ("tz", "0"),
                ("geo", self.geo.as_str()),
                ("ns", "15"),
            ])
            .send()
            .await
            .context("daily trends get()")?
            .error_for_status()
            .context("daily trends status")?
            .text()
            .await
            .context("daily trends .text()")?;
        parse_daily_trends(&body, self.per_poll)
    }

    fn name(&self) -> &'static str {
        "Google Trends"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_stripped_before_parsing() {
        let body = include_str!("../../../tests/fixtures/daily_trends.json");
        assert!(body.starts_with(")]}"));
        let got = parse_daily_trends(body, 10).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].topic, "AI Breakthrough");
        assert_eq!(got[0].related_queries, vec!["ai news", "machine learning"]);
        assert!(got.iter().all(|c| c.source == TrendSource::Google));
    }

    #[test]
    fn per_poll_caps_the_first_day() {
        let body = include_str!("../../../tests/fixtures/daily_trends.json");
        let got = parse_daily_trends(body, 1).unwrap();
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn body_without_json_is_an_error() {
        assert!(parse_daily_trends(")]}',", 10).is_err());
    }
}
