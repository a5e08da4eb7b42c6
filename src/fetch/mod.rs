// src/fetch/mod.rs
pub mod providers;

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::gate::FreshnessProbe;

/// Descriptions are clipped to this many characters at normalization time.
pub const DESCRIPTION_CAP: usize = 200;

/// Article count used when the cascade only needs to know whether any
/// coverage exists at all.
const FRESHNESS_PROBE_LIMIT: usize = 5;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetch_queries_total", "Topic queries sent into the cascade.");
        describe_counter!("fetch_articles_total", "Articles returned by the cascade.");
        describe_counter!(
            "fetch_tier_exhausted_total",
            "Tiers skipped because their credential pool hit its cap."
        );
        describe_counter!(
            "provider_rate_limited_total",
            "HTTP 429 replies across all provider tiers."
        );
        describe_counter!(
            "provider_retries_total",
            "Backoff retry rounds taken by provider adapters."
        );
        describe_counter!("provider_errors_total", "Provider fetch/parse errors.");
        describe_histogram!("provider_fetch_ms", "Per-tier fetch time in milliseconds.");
    });
}

/// Provider-agnostic article record used everywhere downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub source_name: String,
    pub title: String,
    pub description: String,
    pub published_at: String,
}

impl Article {
    /// Build a normalized record, clipping the description to
    /// [`DESCRIPTION_CAP`] characters.
    pub fn new(
        source_name: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        published_at: impl Into<String>,
    ) -> Self {
        let description: String = description.into();
        let description = if description.chars().count() > DESCRIPTION_CAP {
            description.chars().take(DESCRIPTION_CAP).collect()
        } else {
            description
        };
        Self {
            source_name: source_name.into(),
            title: title.into(),
            description,
            published_at: published_at.into(),
        }
    }
}

/// Outcome of one provider tier for one query.
#[derive(Debug)]
pub enum SourceFetch {
    /// Articles found; may be empty when the provider has no coverage.
    Articles(Vec<Article>),
    /// Every credential of the tier is at its quota cap. The cascade
    /// skips the tier immediately instead of waiting the window out.
    Exhausted,
}

/// One tier of the news cascade.
///
/// Adapters fail soft: any upstream error ends up as an empty batch
/// after logging, never as an error the caller has to handle.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch(&self, query: &str, limit: usize) -> SourceFetch;
    fn name(&self) -> &'static str;
}

/// Priority-ordered provider cascade.
///
/// Tiers are queried in order and results accumulate until `max_results`
/// is reached; the final list is truncated to exactly that count. The
/// cascade does not deduplicate across tiers; ordering favors earlier
/// (more trusted) tiers.
pub struct NewsCascade {
    tiers: Vec<Box<dyn ArticleSource>>,
}

impl NewsCascade {
    pub fn new(tiers: Vec<Box<dyn ArticleSource>>) -> Self {
        Self { tiers }
    }

    pub async fn fetch_articles(&self, query: &str, max_results: usize) -> Vec<Article> {
        ensure_metrics_described();
        counter!("fetch_queries_total").increment(1);

        let mut collected: Vec<Article> = Vec::new();
        for tier in &self.tiers {
            if collected.len() >= max_results {
                break;
            }
            let remaining = max_results - collected.len();
            let t0 = std::time::Instant::now();
            let outcome = tier.fetch(query, remaining).await;
            let ms = t0.elapsed().as_secs_f64() * 1_000.0;
            histogram!("provider_fetch_ms").record(ms);

            match outcome {
                SourceFetch::Articles(batch) => {
                    if batch.is_empty() {
                        tracing::debug!(provider = tier.name(), query, "tier had no coverage");
                        continue;
                    }
                    tracing::info!(
                        provider = tier.name(),
                        count = batch.len(),
                        query,
                        "fetched articles"
                    );
                    collected.extend(batch);
                }
                SourceFetch::Exhausted => {
                    tracing::warn!(
                        provider = tier.name(),
                        "credential pool exhausted; skipping tier"
                    );
                    counter!("fetch_tier_exhausted_total").increment(1);
                }
            }
        }

        collected.truncate(max_results);
        counter!("fetch_articles_total").increment(collected.len() as u64);
        collected
    }
}

#[async_trait]
impl FreshnessProbe for NewsCascade {
    /// A topic counts as having fresh coverage when any tier still
    /// returns at least one article for it.
    async fn has_fresh_news(&self, topic: &str) -> bool {
        !self.fetch_articles(topic, FRESHNESS_PROBE_LIMIT).await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedTier {
        name: &'static str,
        batch: Vec<Article>,
        calls: Arc<AtomicUsize>,
    }

    impl FixedTier {
        fn new(name: &'static str, count: usize) -> Self {
            Self::counted(name, count, Arc::new(AtomicUsize::new(0)))
        }

        fn counted(name: &'static str, count: usize, calls: Arc<AtomicUsize>) -> Self {
            let batch = (0..count)
                .map(|i| Article::new(name, format!("{name} story {i}"), "d", "2026-01-01"))
                .collect();
            Self { name, batch, calls }
        }
    }

    #[async_trait]
    impl ArticleSource for FixedTier {
        async fn fetch(&self, _query: &str, limit: usize) -> SourceFetch {
            self.calls.fetch_add(1, Ordering::SeqCst);
            SourceFetch::Articles(self.batch.iter().take(limit).cloned().collect())
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    struct ExhaustedTier;

    #[async_trait]
    impl ArticleSource for ExhaustedTier {
        async fn fetch(&self, _query: &str, _limit: usize) -> SourceFetch {
            SourceFetch::Exhausted
        }

        fn name(&self) -> &'static str {
            "exhausted"
        }
    }

    #[test]
    fn description_is_clipped_at_normalization() {
        let long = "x".repeat(DESCRIPTION_CAP + 50);
        let a = Article::new("s", "t", long, "2026-01-01");
        assert_eq!(a.description.chars().count(), DESCRIPTION_CAP);
    }

    #[tokio::test]
    async fn later_tiers_are_not_queried_once_full() {
        let second_calls = Arc::new(AtomicUsize::new(0));
        let cascade = NewsCascade::new(vec![
            Box::new(FixedTier::new("first", 5)) as Box<dyn ArticleSource>,
            Box::new(FixedTier::counted("second", 5, second_calls.clone())),
        ]);

        let got = cascade.fetch_articles("ai", 5).await;
        assert_eq!(got.len(), 5);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shortfall_accumulates_across_tiers_and_truncates() {
        let cascade = NewsCascade::new(vec![
            Box::new(FixedTier::new("first", 3)),
            Box::new(FixedTier::new("second", 9)),
        ]);
        let got = cascade.fetch_articles("ai", 5).await;
        assert_eq!(got.len(), 5);
        assert_eq!(got[0].source_name, "first");
        assert_eq!(got[3].source_name, "second");
    }

    #[tokio::test]
    async fn exhausted_tier_is_skipped_without_results() {
        let cascade = NewsCascade::new(vec![
            Box::new(ExhaustedTier) as Box<dyn ArticleSource>,
            Box::new(FixedTier::new("fallback", 2)),
        ]);
        let got = cascade.fetch_articles("ai", 5).await;
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|a| a.source_name == "fallback"));
    }

    #[tokio::test]
    async fn empty_everywhere_means_empty_result() {
        let cascade = NewsCascade::new(vec![Box::new(FixedTier::new("first", 0))]);
        assert!(cascade.fetch_articles("ai", 5).await.is_empty());
    }
}
