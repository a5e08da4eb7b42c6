// src/trends/mod.rs
pub mod sources;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Normalized topics are capped at this many characters.
const TOPIC_CAP: usize = 200;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "trend_candidates_total",
            "Raw trend candidates returned by all sources."
        );
        describe_counter!("trend_source_errors_total", "Trend source fetch/parse errors.");
        describe_gauge!(
            "trend_last_poll_ts",
            "Unix ts when the trend fan-out last completed."
        );
        describe_histogram!("trend_poll_ms", "Whole fan-out duration in milliseconds.");
    });
}

/// Where a trend candidate came from; drives its score contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendSource {
    Google,
    Reddit,
    News,
    Tech,
    Other,
}

impl TrendSource {
    /// Score weight added per appearance from this source class.
    pub fn weight(self) -> u32 {
        match self {
            TrendSource::Google => 100,
            TrendSource::Reddit => 80,
            TrendSource::News => 70,
            TrendSource::Tech => 60,
            TrendSource::Other => 50,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrendSource::Google => "google",
            TrendSource::Reddit => "reddit",
            TrendSource::News => "news",
            TrendSource::Tech => "tech",
            TrendSource::Other => "other",
        }
    }
}

/// Raw candidate emitted by one trend source.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendCandidate {
    pub topic: String,
    pub source: TrendSource,
    pub related_queries: Vec<String>,
    pub category: Option<String>,
}

impl TrendCandidate {
    pub fn bare(topic: impl Into<String>, source: TrendSource) -> Self {
        Self {
            topic: topic.into(),
            source,
            related_queries: Vec::new(),
            category: None,
        }
    }
}

/// Merged, scored topic ready for the content loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredTrend {
    /// Display casing from the first source that surfaced the topic.
    pub topic: String,
    pub score: u32,
    pub sources: BTreeSet<TrendSource>,
    pub related_queries: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub seo_keywords: Vec<String>,
}

impl ScoredTrend {
    fn seed(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            score: 0,
            sources: BTreeSet::new(),
            related_queries: BTreeSet::new(),
            categories: BTreeSet::new(),
            seo_keywords: Vec::new(),
        }
    }
}

/// One trend source polled by the fan-out.
#[async_trait]
pub trait TrendProvider: Send + Sync {
    async fn fetch_trends(&self) -> Result<Vec<TrendCandidate>>;
    fn name(&self) -> &'static str;
}

/// Normalize a headline or query into a topic string.
pub fn normalize_topic(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    if out.chars().count() > TOPIC_CAP {
        out = out.chars().take(TOPIC_CAP).collect();
    }
    out
}

/// Poll every source concurrently; a failing source is logged and
/// contributes nothing.
///
/// One task per source, joined in declared order, so the candidate
/// stream (and therefore tie-breaking downstream) is deterministic for
/// a given set of source replies.
pub async fn collect_trends(providers: &[Arc<dyn TrendProvider>]) -> Vec<TrendCandidate> {
    ensure_metrics_described();
    let t0 = std::time::Instant::now();

    let mut handles = Vec::with_capacity(providers.len());
    for provider in providers {
        let name = provider.name();
        let provider = Arc::clone(provider);
        handles.push((
            name,
            tokio::spawn(async move { provider.fetch_trends().await }),
        ));
    }

    let mut out = Vec::new();
    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(mut candidates)) => {
                tracing::debug!(provider = name, count = candidates.len(), "trend source ok");
                counter!("trend_candidates_total").increment(candidates.len() as u64);
                out.append(&mut candidates);
            }
            Ok(Err(e)) => {
                tracing::warn!(error = ?e, provider = name, "trend source error");
                counter!("trend_source_errors_total").increment(1);
            }
            Err(e) => {
                tracing::warn!(error = ?e, provider = name, "trend source task failed");
                counter!("trend_source_errors_total").increment(1);
            }
        }
    }

    gauge!("trend_last_poll_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
    metrics::histogram!("trend_poll_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    out
}

/// Merge candidates case-insensitively and score by source weights.
///
/// The merge key is the lowercased topic; the displayed casing is
/// whichever variant was seen first. Sorting by score descending is
/// stable, so equal scores keep encounter order.
pub fn aggregate(candidates: Vec<TrendCandidate>) -> Vec<ScoredTrend> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<ScoredTrend> = Vec::new();

    for cand in candidates {
        let topic = cand.topic.trim();
        if topic.is_empty() {
            continue;
        }
        let key = topic.to_lowercase();
        let slot = match index.get(&key) {
            Some(&i) => i,
            None => {
                merged.push(ScoredTrend::seed(topic));
                index.insert(key, merged.len() - 1);
                merged.len() - 1
            }
        };
        let entry = &mut merged[slot];
        entry.score += cand.source.weight();
        entry.sources.insert(cand.source);
        for q in cand.related_queries {
            let q = q.trim();
            if !q.is_empty() {
                entry.related_queries.insert(q.to_string());
            }
        }
        if let Some(cat) = cand.category {
            let cat = cat.trim();
            if !cat.is_empty() {
                entry.categories.insert(cat.to_string());
            }
        }
    }

    for entry in &mut merged {
        entry.seo_keywords = seo_keywords(&entry.topic, &entry.related_queries, &entry.categories);
    }

    merged.sort_by(|a, b| b.score.cmp(&a.score));
    merged
}

/// Keyword list for the stored record: the topic itself, its related
/// queries, and both orderings of every category/topic pair. First
/// occurrence wins on duplicates.
fn seo_keywords(
    topic: &str,
    related: &BTreeSet<String>,
    categories: &BTreeSet<String>,
) -> Vec<String> {
    fn push_unique(kw: String, seen: &mut BTreeSet<String>, out: &mut Vec<String>) {
        if seen.insert(kw.to_lowercase()) {
            out.push(kw);
        }
    }

    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut out = Vec::new();
    push_unique(topic.to_string(), &mut seen, &mut out);
    for q in related {
        push_unique(q.clone(), &mut seen, &mut out);
    }
    for cat in categories {
        push_unique(format!("{cat} {topic}"), &mut seen, &mut out);
        push_unique(format!("{topic} {cat}"), &mut seen, &mut out);
    }
    out
}
