//! # Topic Gate
//! Decides whether a ranked trend becomes an article this cycle.
//!
//! Rules run in a fixed order: stoplist, starvation escape, recency
//! (with a fresh-coverage override), stored duplicates, and fuzzy
//! similarity against topics already accepted in the current run. The
//! stoplist always wins; the starvation escape bypasses everything
//! after it once too many consecutive topics were rejected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{DocumentStore, FIELD_TIME, FIELD_TOPIC};

fn default_stoplist() -> Vec<String> {
    ["today", "now", "news"].map(str::to_string).to_vec()
}
fn default_similarity_threshold() -> u32 {
    80
}
fn default_recency_window_secs() -> u64 {
    7200
}
fn default_force_process_threshold() -> u32 {
    10
}

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("gate_accepts_total", "Topics the gate let through.");
        describe_counter!("gate_skips_total", "Topics the gate rejected.");
        describe_counter!(
            "gate_force_accepts_total",
            "Topics accepted by the starvation escape."
        );
    });
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Generic words that never become articles.
    #[serde(default = "default_stoplist")]
    pub stoplist: Vec<String>,
    /// Fuzzy match score (0-100) at or above which two topics count as
    /// the same story.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: u32,
    /// How long a processed topic stays "recent".
    #[serde(default = "default_recency_window_secs")]
    pub recency_window_secs: u64,
    /// Consecutive rejections before the starvation escape fires.
    #[serde(default = "default_force_process_threshold")]
    pub force_process_threshold: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            stoplist: default_stoplist(),
            similarity_threshold: default_similarity_threshold(),
            recency_window_secs: default_recency_window_secs(),
            force_process_threshold: default_force_process_threshold(),
        }
    }
}

/// Why a topic was not turned into an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Matched the stoplist of generic words.
    Stoplisted,
    /// Processed within the recency window and no fresh coverage found.
    RecentlyCovered,
    /// An article for the same topic already sits in the store.
    DuplicateInStore,
    /// Too close to a topic accepted earlier in this run.
    SimilarTopic,
    /// Gate said yes but no provider had any articles. Emitted by the
    /// pipeline, never by the gate itself.
    NoCoverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Accept,
    Skip(SkipReason),
}

/// Answers "does any provider still have coverage for this topic?"
/// during the recency re-check.
#[async_trait]
pub trait FreshnessProbe: Send + Sync {
    async fn has_fresh_news(&self, topic: &str) -> bool;
}

/// Fuzzy similarity score on 0-100, case-insensitive. 100 means equal.
pub fn similarity_score(a: &str, b: &str) -> u32 {
    let score = strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase());
    (score * 100.0).round() as u32
}

pub struct TopicGate {
    cfg: GateConfig,
    store: Arc<dyn DocumentStore>,
    probe: Arc<dyn FreshnessProbe>,
    /// Lowercased topic -> last successful processing (UNIX ms).
    /// Entries are never purged; stale ones simply stop matching.
    recent: Mutex<HashMap<String, u64>>,
    /// Topics accepted in the current run, in acceptance order.
    surfaced: Mutex<Vec<String>>,
    /// Consecutive rejections; survives across cycles.
    skips: AtomicU32,
}

impl TopicGate {
    pub fn new(cfg: GateConfig, store: Arc<dyn DocumentStore>, probe: Arc<dyn FreshnessProbe>) -> Self {
        ensure_metrics_described();
        Self {
            cfg,
            store,
            probe,
            recent: Mutex::new(HashMap::new()),
            surfaced: Mutex::new(Vec::new()),
            skips: AtomicU32::new(0),
        }
    }

    /// Forget which topics were surfaced; call at the top of each cycle.
    /// The consecutive-skip counter deliberately survives.
    pub fn begin_run(&self) {
        self.surfaced.lock().expect("gate mutex poisoned").clear();
    }

    /// Record a completed article so the recency rule sees the topic.
    pub fn mark_processed(&self, topic: &str) {
        self.mark_processed_at(topic, now_millis());
    }

    pub fn mark_processed_at(&self, topic: &str, now_ms: u64) {
        self.recent
            .lock()
            .expect("gate mutex poisoned")
            .insert(topic.to_lowercase(), now_ms);
    }

    pub fn consecutive_skips(&self) -> u32 {
        self.skips.load(Ordering::SeqCst)
    }

    pub async fn evaluate(&self, topic: &str) -> GateVerdict {
        self.evaluate_at(topic, now_millis()).await
    }

    pub async fn evaluate_at(&self, topic: &str, now_ms: u64) -> GateVerdict {
        // Stoplist wins over everything, including the starvation escape.
        if self.is_stoplisted(topic) {
            return self.reject(topic, SkipReason::Stoplisted);
        }

        let skips = self.skips.load(Ordering::SeqCst);
        if skips >= self.cfg.force_process_threshold {
            tracing::info!(topic, skips, "force-processing after consecutive skips");
            counter!("gate_force_accepts_total").increment(1);
            return self.accept(topic);
        }

        if self.seen_recently(topic, now_ms) {
            if !self.probe.has_fresh_news(topic).await {
                return self.reject(topic, SkipReason::RecentlyCovered);
            }
            tracing::debug!(topic, "fresh coverage overrides recency");
        }

        match self.stored_duplicate(topic, now_ms).await {
            Ok(true) => return self.reject(topic, SkipReason::DuplicateInStore),
            Ok(false) => {}
            Err(e) => {
                // A store outage must not wedge the loop.
                tracing::warn!(error = ?e, topic, "duplicate lookup failed; assuming none");
            }
        }

        if let Some(similar) = self.similar_surfaced(topic) {
            tracing::debug!(topic, similar = similar.as_str(), "similar topic already surfaced");
            return self.reject(topic, SkipReason::SimilarTopic);
        }

        self.accept(topic)
    }

    fn accept(&self, topic: &str) -> GateVerdict {
        self.surfaced
            .lock()
            .expect("gate mutex poisoned")
            .push(topic.to_string());
        self.skips.store(0, Ordering::SeqCst);
        counter!("gate_accepts_total").increment(1);
        GateVerdict::Accept
    }

    fn reject(&self, topic: &str, reason: SkipReason) -> GateVerdict {
        self.skips.fetch_add(1, Ordering::SeqCst);
        counter!("gate_skips_total").increment(1);
        tracing::info!(topic, reason = ?reason, "topic skipped");
        GateVerdict::Skip(reason)
    }

    fn is_stoplisted(&self, topic: &str) -> bool {
        self.cfg
            .stoplist
            .iter()
            .any(|w| w.eq_ignore_ascii_case(topic.trim()))
    }

    fn seen_recently(&self, topic: &str, now_ms: u64) -> bool {
        let window_ms = self.cfg.recency_window_secs.saturating_mul(1000);
        let recent = self.recent.lock().expect("gate mutex poisoned");
        match recent.get(&topic.to_lowercase()) {
            Some(&at_ms) => now_ms.saturating_sub(at_ms) <= window_ms,
            None => false,
        }
    }

    async fn stored_duplicate(&self, topic: &str, now_ms: u64) -> anyhow::Result<bool> {
        let hits = self
            .store
            .query(
                crate::store::CONTENT_COLLECTION,
                FIELD_TOPIC,
                &Value::String(topic.to_string()),
                FIELD_TIME,
                1,
            )
            .await?;
        let Some(doc) = hits.first() else {
            return Ok(false);
        };
        let Some(Value::String(time)) = doc.fields.get(FIELD_TIME) else {
            return Ok(false);
        };
        match chrono::DateTime::parse_from_rfc3339(time) {
            Ok(at) => {
                let at_ms = at.timestamp_millis().max(0) as u64;
                let window_ms = self.cfg.recency_window_secs.saturating_mul(1000);
                Ok(now_ms.saturating_sub(at_ms) <= window_ms)
            }
            Err(e) => {
                // An unreadable timestamp never blocks coverage.
                tracing::warn!(error = ?e, doc = doc.id.as_str(), "bad time field on stored doc");
                Ok(false)
            }
        }
    }

    fn similar_surfaced(&self, topic: &str) -> Option<String> {
        let surfaced = self.surfaced.lock().expect("gate mutex poisoned");
        surfaced
            .iter()
            .find(|s| similarity_score(topic, s) >= self.cfg.similarity_threshold)
            .cloned()
    }
}

/// Current UNIX time in milliseconds.
fn now_millis() -> u64 {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ArticleRecord, FeatureFlags, MemoryStore, CONTENT_COLLECTION};
    use chrono::Utc;

    struct StaticProbe(bool);

    #[async_trait]
    impl FreshnessProbe for StaticProbe {
        async fn has_fresh_news(&self, _topic: &str) -> bool {
            self.0
        }
    }

    fn gate_with(cfg: GateConfig, store: Arc<MemoryStore>, fresh: bool) -> TopicGate {
        TopicGate::new(cfg, store, Arc::new(StaticProbe(fresh)))
    }

    fn gate(cfg: GateConfig) -> TopicGate {
        gate_with(cfg, Arc::new(MemoryStore::new()), false)
    }

    async fn insert_article(store: &MemoryStore, topic: &str, time: String) {
        let rec = ArticleRecord {
            user: "Anonymous".into(),
            time: time.clone(),
            original_headline: topic.into(),
            engaging_headline: topic.into(),
            category: "technology".into(),
            content_type: "article".into(),
            content: "## Body".into(),
            image_url: None,
            trending_topics: topic.into(),
            seo_keywords: vec![],
            generation_backend: "mock".into(),
            features: FeatureFlags::default(),
        };
        store
            .insert(CONTENT_COLLECTION, &format!("{time}_{topic}"), rec.into_fields())
            .await
            .unwrap();
    }

    #[test]
    fn similarity_is_case_insensitive_and_100_for_equal() {
        assert_eq!(similarity_score("AI Breakthrough", "ai breakthrough"), 100);
        assert!(similarity_score("AI Breakthrough", "Quantum Chips") < 50);
    }

    #[tokio::test]
    async fn stoplist_rejects_regardless_of_casing() {
        let g = gate(GateConfig::default());
        assert_eq!(
            g.evaluate("Today").await,
            GateVerdict::Skip(SkipReason::Stoplisted)
        );
        assert_eq!(
            g.evaluate("NEWS").await,
            GateVerdict::Skip(SkipReason::Stoplisted)
        );
        assert_eq!(g.consecutive_skips(), 2);
    }

    #[tokio::test]
    async fn stoplist_beats_the_starvation_escape() {
        let cfg = GateConfig {
            force_process_threshold: 1,
            ..GateConfig::default()
        };
        let g = gate(cfg);
        let _ = g.evaluate("now").await;
        assert!(g.consecutive_skips() >= 1);
        assert_eq!(
            g.evaluate("today").await,
            GateVerdict::Skip(SkipReason::Stoplisted)
        );
    }

    #[tokio::test]
    async fn starvation_escape_bypasses_recency() {
        let cfg = GateConfig {
            force_process_threshold: 2,
            ..GateConfig::default()
        };
        let g = gate(cfg);
        g.mark_processed_at("Hot Topic", 1_000_000);

        // Without pressure the recent topic is rejected (probe is dry).
        assert_eq!(
            g.evaluate_at("Hot Topic", 1_000_500).await,
            GateVerdict::Skip(SkipReason::RecentlyCovered)
        );
        let _ = g.evaluate("now").await;
        assert_eq!(g.consecutive_skips(), 2);

        // At the threshold the same topic sails through.
        assert_eq!(
            g.evaluate_at("Hot Topic", 1_001_000).await,
            GateVerdict::Accept
        );
        assert_eq!(g.consecutive_skips(), 0);
    }

    #[tokio::test]
    async fn recent_topic_needs_fresh_coverage() {
        let store = Arc::new(MemoryStore::new());
        let dry = gate_with(GateConfig::default(), store.clone(), false);
        dry.mark_processed_at("Mars Landing", 1_000_000);
        assert_eq!(
            dry.evaluate_at("mars landing", 1_000_000 + 3600 * 1000).await,
            GateVerdict::Skip(SkipReason::RecentlyCovered)
        );

        let fresh = gate_with(GateConfig::default(), store, true);
        fresh.mark_processed_at("Mars Landing", 1_000_000);
        assert_eq!(
            fresh.evaluate_at("mars landing", 1_000_000 + 3600 * 1000).await,
            GateVerdict::Accept
        );
    }

    #[tokio::test]
    async fn recency_expires_with_the_window() {
        let g = gate(GateConfig::default());
        g.mark_processed_at("Old Story", 1_000_000);
        let past_window = 1_000_000 + 7200 * 1000 + 1;
        assert_eq!(
            g.evaluate_at("Old Story", past_window).await,
            GateVerdict::Accept
        );
    }

    #[tokio::test]
    async fn stored_duplicate_inside_window_rejects() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        insert_article(
            &store,
            "Quantum Chips",
            (now - chrono::Duration::hours(1)).to_rfc3339(),
        )
        .await;
        let g = gate_with(GateConfig::default(), store, false);
        assert_eq!(
            g.evaluate("Quantum Chips").await,
            GateVerdict::Skip(SkipReason::DuplicateInStore)
        );
    }

    #[tokio::test]
    async fn stale_stored_duplicate_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        insert_article(
            &store,
            "Quantum Chips",
            (now - chrono::Duration::hours(3)).to_rfc3339(),
        )
        .await;
        let g = gate_with(GateConfig::default(), store, false);
        assert_eq!(g.evaluate("Quantum Chips").await, GateVerdict::Accept);
    }

    #[tokio::test]
    async fn unreadable_stored_time_never_blocks() {
        let store = Arc::new(MemoryStore::new());
        insert_article(&store, "Quantum Chips", "yesterday-ish".to_string()).await;
        let g = gate_with(GateConfig::default(), store, false);
        assert_eq!(g.evaluate("Quantum Chips").await, GateVerdict::Accept);
    }

    #[tokio::test]
    async fn similar_topic_in_same_run_rejects() {
        let g = gate(GateConfig::default());
        assert_eq!(g.evaluate("AI Breakthrough in 2026").await, GateVerdict::Accept);
        assert_eq!(
            g.evaluate("AI Breakthrough on 2026").await,
            GateVerdict::Skip(SkipReason::SimilarTopic)
        );
        assert_eq!(g.evaluate("Completely Different Subject").await, GateVerdict::Accept);
    }

    #[tokio::test]
    async fn begin_run_clears_surfaced_topics() {
        let g = gate(GateConfig::default());
        assert_eq!(g.evaluate("AI Breakthrough in 2026").await, GateVerdict::Accept);
        g.begin_run();
        assert_eq!(g.evaluate("AI Breakthrough on 2026").await, GateVerdict::Accept);
    }

    #[tokio::test]
    async fn accept_resets_the_skip_counter() {
        let g = gate(GateConfig::default());
        let _ = g.evaluate("now").await;
        let _ = g.evaluate("today").await;
        assert_eq!(g.consecutive_skips(), 2);
        let _ = g.evaluate("Fresh Subject").await;
        assert_eq!(g.consecutive_skips(), 0);
    }
}
