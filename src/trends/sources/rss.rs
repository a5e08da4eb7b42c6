//! RSS headline source for curated news and tech outlets.
//!
//! One provider instance covers one source class (news sites or tech
//! blogs) over a list of feeds. Headlines older than the freshness
//! window are not trends anymore and are dropped; items without a
//! parseable date are kept.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::fetch::providers::build_http_client;
use crate::trends::{normalize_topic, TrendCandidate, TrendProvider, TrendSource};

/// Headlines older than this are no longer trending.
const MAX_HEADLINE_AGE_SECS: u64 = 48 * 3600;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

fn parse_rfc2822_to_unix(ts: &str) -> u64 {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
        .unwrap_or(0)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

fn parse_feed_titles(
    now: u64,
    xml: &str,
    source: TrendSource,
    per_feed: usize,
) -> Result<Vec<TrendCandidate>> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).context("parsing trend feed xml")?;

    let mut out = Vec::new();
    for it in rss.channel.item {
        if out.len() >= per_feed {
            break;
        }
        let published = it.pub_date.as_deref().map(parse_rfc2822_to_unix).unwrap_or(0);
        if published > 0 && now.saturating_sub(published) > MAX_HEADLINE_AGE_SECS {
            continue;
        }
        let topic = normalize_topic(it.title.as_deref().unwrap_or_default());
        if topic.is_empty() {
            continue;
        }
        out.push(TrendCandidate {
            topic,
            source,
            related_queries: Vec::new(),
            category: None,
        });
    }
    Ok(out)
}

pub struct FeedTrendsProvider {
    http: reqwest::Client,
    label: &'static str,
    source: TrendSource,
    feeds: Vec<String>,
    per_feed: usize,
}

impl FeedTrendsProvider {
    pub fn new(
        label: &'static str,
        source: TrendSource,
        feeds: Vec<String>,
        per_feed: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            http: build_http_client(timeout),
            label,
            source,
            feeds,
            per_feed,
        }
    }

    async fn fetch_feed(&self, url: &str) -> Result<Vec<TrendCandidate>> {
        let body = self
            .http
            .get(url)
            .send()
            .await
            .context("trend feed get()")?
            .error_for_status()
            .context("trend feed status")?
            .text()
            .await
            .context("trend feed .text()")?;
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        parse_feed_titles(now, &body, self.source, self.per_feed)
    }
}

#[async_trait]
impl TrendProvider for FeedTrendsProvider {
    async fn fetch_trends(&self) -> Result<Vec<TrendCandidate>> {
        let mut out = Vec::new();
        for url in &self.feeds {
            match self.fetch_feed(url).await {
                Ok(mut candidates) => out.append(&mut candidates),
                Err(e) => {
                    tracing::warn!(error = ?e, feed = url.as_str(), "trend feed poll failed");
                    counter!("trend_source_errors_total").increment(1);
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        self.label
    }
}
